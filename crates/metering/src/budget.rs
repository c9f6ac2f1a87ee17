//! Pre-flight budget enforcement
//!
//! The guard runs before every metered provider call and decides whether the
//! estimated cost fits in the tenant's remaining monthly budget. A limit of
//! zero (or unset) means unlimited.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{MeteringError, MeteringResult};

/// Behavior when the budget lookup itself fails
///
/// `Open` permits the call rather than blocking all AI usage on an
/// infrastructure error; `Closed` propagates the failure. The default is
/// `Open`; an operator can flip it via `BUDGET_FAIL_MODE=closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailMode {
    #[default]
    Open,
    Closed,
}

impl std::str::FromStr for FailMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" | "fail-open" => Ok(Self::Open),
            "closed" | "fail-closed" => Ok(Self::Closed),
            other => Err(format!("unknown budget fail mode: {}", other)),
        }
    }
}

/// Outcome of a budget check, carrying the numbers the caller needs to
/// render a precise status or denial message
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BudgetDecision {
    Allowed {
        current_spend: f64,
        budget_limit: f64,
        /// True when the lookup failed and the fail-open policy let the
        /// call through; spend/limit are zero in that case.
        degraded: bool,
    },
    Denied {
        current_spend: f64,
        budget_limit: f64,
        estimated_cost: f64,
    },
}

impl BudgetDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Pure budget policy: allow iff the limit is unlimited or the estimate fits
pub fn evaluate(budget_limit: f64, current_spend: f64, estimated_cost: f64) -> BudgetDecision {
    if budget_limit <= 0.0 {
        return BudgetDecision::Allowed {
            current_spend,
            budget_limit,
            degraded: false,
        };
    }

    if current_spend + estimated_cost <= budget_limit {
        BudgetDecision::Allowed {
            current_spend,
            budget_limit,
            degraded: false,
        }
    } else {
        BudgetDecision::Denied {
            current_spend,
            budget_limit,
            estimated_cost,
        }
    }
}

/// Budget guard service
#[derive(Clone)]
pub struct BudgetGuard {
    pool: PgPool,
    fail_mode: FailMode,
}

impl BudgetGuard {
    pub fn new(pool: PgPool, fail_mode: FailMode) -> Self {
        Self { pool, fail_mode }
    }

    /// Check whether a call estimated at `estimated_cost` may proceed
    ///
    /// Must run before the provider call; reversing the order would allow
    /// unbounded spend.
    pub async fn check(
        &self,
        company_id: Uuid,
        estimated_cost: f64,
    ) -> MeteringResult<BudgetDecision> {
        let row: Result<Option<(f64, f64)>, sqlx::Error> =
            sqlx::query_as("SELECT monthly_budget, current_spend FROM companies WHERE id = $1")
                .bind(company_id)
                .fetch_optional(&self.pool)
                .await;

        match row {
            Ok(Some((budget_limit, current_spend))) => {
                let decision = evaluate(budget_limit, current_spend, estimated_cost);
                if let BudgetDecision::Denied { .. } = decision {
                    tracing::info!(
                        company_id = %company_id,
                        current_spend = current_spend,
                        budget_limit = budget_limit,
                        estimated_cost = estimated_cost,
                        "Budget guard denied AI call"
                    );
                }
                Ok(decision)
            }
            Ok(None) => Err(MeteringError::CompanyNotFound(company_id)),
            Err(e) => match self.fail_mode {
                FailMode::Open => {
                    // Availability over strictness: a broken budget lookup
                    // must not turn into a platform-wide AI outage.
                    tracing::error!(
                        company_id = %company_id,
                        error = %e,
                        "Budget lookup failed, failing open"
                    );
                    Ok(BudgetDecision::Allowed {
                        current_spend: 0.0,
                        budget_limit: 0.0,
                        degraded: true,
                    })
                }
                FailMode::Closed => {
                    tracing::error!(
                        company_id = %company_id,
                        error = %e,
                        "Budget lookup failed, failing closed"
                    );
                    Err(MeteringError::Database(e.to_string()))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_zero_limit_is_unlimited() {
        assert!(evaluate(0.0, 1_000_000.0, 50.0).is_allowed());
        assert!(evaluate(-1.0, 10.0, 10.0).is_allowed());
    }

    #[test]
    fn test_allows_up_to_limit_inclusive() {
        // L=100, S=85, c=10 -> allowed (spend would become 95)
        match evaluate(100.0, 85.0, 10.0) {
            BudgetDecision::Allowed {
                current_spend,
                budget_limit,
                degraded,
            } => {
                assert_eq!(current_spend, 85.0);
                assert_eq!(budget_limit, 100.0);
                assert!(!degraded);
            }
            other => panic!("expected allowed, got {:?}", other),
        }
        // Exactly hitting the limit is still allowed
        assert!(evaluate(100.0, 85.0, 15.0).is_allowed());
    }

    #[test]
    fn test_denial_surfaces_spend_and_limit() {
        // L=100, S=85, c=20 -> denied with the numbers attached
        match evaluate(100.0, 85.0, 20.0) {
            BudgetDecision::Denied {
                current_spend,
                budget_limit,
                estimated_cost,
            } => {
                assert_eq!(current_spend, 85.0);
                assert_eq!(budget_limit, 100.0);
                assert_eq!(estimated_cost, 20.0);
            }
            other => panic!("expected denied, got {:?}", other),
        }
    }

    #[test]
    fn test_fail_mode_parsing() {
        assert_eq!(FailMode::from_str("open").unwrap(), FailMode::Open);
        assert_eq!(FailMode::from_str("CLOSED").unwrap(), FailMode::Closed);
        assert_eq!(FailMode::from_str("fail-open").unwrap(), FailMode::Open);
        assert!(FailMode::from_str("maybe").is_err());
    }
}
