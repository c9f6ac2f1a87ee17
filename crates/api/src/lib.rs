#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Jarvis HQ API Library
//!
//! HTTP surface for the metering and settlement pipelines, plus the
//! outbound event notifier.

pub mod config;
pub mod error;
pub mod notify;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use notify::{EventKind, Notifier};
pub use state::AppState;
