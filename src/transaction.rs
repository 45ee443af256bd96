// 8.0: transactional plan execution. a plan either applies in full or leaves the
// portfolio exactly as it was. the snapshot is a full clone of the portfolio;
// state is cheap enough (a handful of positions) that cloning beats journaling.

use crate::action::{ActionError, ActionRequest};
use crate::portfolio::{Portfolio, PriceTable};
use crate::risk::{self, RiskLimits};
use crate::types::Timestamp;
use crate::valuation::ValuationParams;
use crate::executor;

#[derive(Debug, Clone)]
pub struct StepResult {
    pub request: ActionRequest,
    pub summary: String,
}

#[derive(Debug, Clone)]
pub struct PlanFailure {
    pub request: ActionRequest,
    pub error: ActionError,
}

#[derive(Debug, Clone)]
pub enum PlanOutcome {
    /// Every step applied; the portfolio holds the new state.
    Applied { steps: Vec<StepResult> },
    /// A step failed; the portfolio was restored to its pre-plan state.
    /// `completed` lists the steps that had applied before the rollback.
    RolledBack {
        completed: Vec<StepResult>,
        failure: PlanFailure,
    },
}

impl PlanOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, PlanOutcome::Applied { .. })
    }
}

/// Run a list of action requests as one transaction. Each step is re-validated
/// against the live, already-mutated portfolio, so limits hold mid-plan: an
/// open that was fine at submission can still fail after an earlier step spent
/// the cash it assumed.
pub fn execute_plan(
    portfolio: &mut Portfolio,
    actions: &[ActionRequest],
    prices: &PriceTable,
    limits: &RiskLimits,
    params: &ValuationParams,
    now: Timestamp,
) -> PlanOutcome {
    let snapshot = portfolio.clone();
    let mut completed = Vec::with_capacity(actions.len());

    for request in actions {
        let result = risk::validate_parameters(request)
            .and_then(|action| {
                risk::validate_portfolio_risk(&action, portfolio, limits)?;
                Ok(action)
            })
            .and_then(|action| executor::apply_action(portfolio, &action, prices, params, now));

        match result {
            Ok(summary) => completed.push(StepResult {
                request: request.clone(),
                summary,
            }),
            Err(error) => {
                *portfolio = snapshot;
                return PlanOutcome::RolledBack {
                    completed,
                    failure: PlanFailure {
                        request: request.clone(),
                        error,
                    },
                };
            }
        }
    }

    PlanOutcome::Applied { steps: completed }
}
