#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Jarvis HQ Shared Types and Utilities
//!
//! This crate contains domain types and database helpers shared across the
//! Jarvis HQ platform.

pub mod db;
pub mod types;

pub use db::*;
pub use types::*;
