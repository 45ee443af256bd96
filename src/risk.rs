//! Risk validation, two phases.
//!
//! Phase one checks an [`ActionRequest`] for parameter presence and ranges and
//! yields a typed [`Action`]. Phase two simulates the action's cash and margin
//! effect against the live portfolio and enforces the account-level limits.
//! The transaction coordinator runs both phases per step, against the already
//! mutated state, so limits hold mid-plan and not just at submission time.

use crate::action::{Action, ActionError, ActionRequest};
use crate::portfolio::Portfolio;
use crate::types::{CoinId, Leverage, Price, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Account-level exposure limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Maximum total margin as a fraction of account value.
    pub max_margin_usage: Decimal,
    /// Minimum free cash as a fraction of account value.
    pub min_cash_reserve: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_margin_usage: dec!(0.25),
            min_cash_reserve: dec!(0.10),
        }
    }
}

// 6.1: parameter validation. every numeric range is enforced here so the
// executor never sees an out-of-range value.

fn require_coin(req: &ActionRequest) -> Result<CoinId, ActionError> {
    match &req.coin {
        Some(c) if !c.trim().is_empty() => Ok(CoinId::new(c.trim())),
        _ => Err(ActionError::MissingParameter {
            action: req.action.clone(),
            field: "coin",
        }),
    }
}

fn require_pct(
    action: &str,
    field: &'static str,
    value: Option<Decimal>,
) -> Result<Decimal, ActionError> {
    let pct = value.ok_or(ActionError::MissingParameter {
        action: action.to_string(),
        field,
    })?;
    if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
        return Err(ActionError::InvalidParameter {
            field,
            detail: format!("{pct} not in [0, 100]"),
        });
    }
    Ok(pct)
}

fn require_leverage(
    action: &str,
    field: &'static str,
    value: Option<Decimal>,
) -> Result<Leverage, ActionError> {
    let raw = value.ok_or(ActionError::MissingParameter {
        action: action.to_string(),
        field,
    })?;
    Leverage::new(raw).ok_or(ActionError::InvalidParameter {
        field,
        detail: format!("{raw} not in [1, 100]"),
    })
}

fn require_price(
    action: &str,
    field: &'static str,
    value: Option<Decimal>,
) -> Result<Price, ActionError> {
    let raw = value.ok_or(ActionError::MissingParameter {
        action: action.to_string(),
        field,
    })?;
    Price::new(raw).ok_or(ActionError::InvalidParameter {
        field,
        detail: format!("{raw} is not a positive price"),
    })
}

pub fn validate_parameters(req: &ActionRequest) -> Result<Action, ActionError> {
    let tag = req.action.trim().to_uppercase();
    let action = match tag.as_str() {
        "BUY_SPOT" => Action::BuySpot {
            coin: require_coin(req)?,
            percentage_of_cash: require_pct(&tag, "percentage_of_cash", req.percentage_of_cash)?,
        },
        "SELL_SPOT" => Action::SellSpot {
            coin: require_coin(req)?,
            percentage_of_holding: require_pct(
                &tag,
                "percentage_of_holding",
                req.percentage_of_holding,
            )?,
        },
        "OPEN_LONG" | "OPEN_SHORT" => Action::OpenFutures {
            coin: require_coin(req)?,
            side: if tag == "OPEN_LONG" {
                Side::Long
            } else {
                Side::Short
            },
            percentage_of_cash: require_pct(&tag, "percentage_of_cash", req.percentage_of_cash)?,
            leverage: require_leverage(&tag, "leverage", req.leverage)?,
        },
        "CLOSE_LONG" | "CLOSE_SHORT" => Action::CloseFutures {
            coin: require_coin(req)?,
            side: if tag == "CLOSE_LONG" {
                Side::Long
            } else {
                Side::Short
            },
        },
        "ADD_MARGIN" => Action::AddMargin {
            coin: require_coin(req)?,
            percentage_of_cash: require_pct(&tag, "percentage_of_cash", req.percentage_of_cash)?,
        },
        "REDUCE_MARGIN" => Action::ReduceMargin {
            coin: require_coin(req)?,
            percentage_of_margin: require_pct(
                &tag,
                "percentage_of_margin",
                req.percentage_of_margin,
            )?,
        },
        "INCREASE_LEVERAGE" => Action::IncreaseLeverage {
            coin: require_coin(req)?,
            new_leverage: require_leverage(&tag, "new_leverage", req.new_leverage)?,
        },
        "DECREASE_LEVERAGE" => Action::DecreaseLeverage {
            coin: require_coin(req)?,
            new_leverage: require_leverage(&tag, "new_leverage", req.new_leverage)?,
        },
        "SET_STOP_LOSS" => Action::SetStopLoss {
            coin: require_coin(req)?,
            stop_price: require_price(&tag, "stop_price", req.stop_price)?,
            reason: req.reason.clone(),
        },
        "SET_TAKE_PROFIT" => Action::SetTakeProfit {
            coin: require_coin(req)?,
            target_price: require_price(&tag, "target_price", req.target_price)?,
            reason: req.reason.clone(),
        },
        "HOLD" => Action::Hold,
        _ => return Err(ActionError::UnknownAction(req.action.clone())),
    };
    Ok(action)
}

// 6.2: portfolio-level limits, simulated before the executor touches state.

fn cash_to_spend(action: &Action, portfolio: &Portfolio) -> Decimal {
    match action {
        Action::BuySpot {
            percentage_of_cash, ..
        }
        | Action::OpenFutures {
            percentage_of_cash, ..
        }
        | Action::AddMargin {
            percentage_of_cash, ..
        } => portfolio.cash * percentage_of_cash / Decimal::ONE_HUNDRED,
        _ => Decimal::ZERO,
    }
}

pub fn validate_portfolio_risk(
    action: &Action,
    portfolio: &Portfolio,
    limits: &RiskLimits,
) -> Result<(), ActionError> {
    if !action.consumes_cash() {
        return Ok(());
    }

    let funds = portfolio.current_funds;
    if funds <= Decimal::ZERO {
        return Err(ActionError::Rejected(
            "account value is non-positive".to_string(),
        ));
    }

    if let Action::OpenFutures { coin, side, .. } = action {
        if let Some(existing) = portfolio.futures_positions.get(coin) {
            if existing.side != *side {
                return Err(ActionError::OppositeSideOpen {
                    coin: coin.clone(),
                    existing: existing.side,
                    requested: *side,
                });
            }
        }

        let margin = cash_to_spend(action, portfolio);
        let projected = (portfolio.margin_used + margin) / funds;
        if projected > limits.max_margin_usage {
            return Err(ActionError::MarginCeiling {
                projected,
                limit: limits.max_margin_usage,
            });
        }
    }

    let spend = cash_to_spend(action, portfolio);
    let projected_reserve = (portfolio.cash - spend) / funds;
    if projected_reserve < limits.min_cash_reserve {
        return Err(ActionError::CashFloor {
            projected: projected_reserve,
            minimum: limits.min_cash_reserve,
        });
    }

    Ok(())
}
