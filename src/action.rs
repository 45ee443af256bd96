// 5.0: the action vocabulary. ActionRequest is the loose shape decoded from
// oracle JSON (everything optional); Action is the validated form the executor
// accepts, produced only by risk::validate_parameters.

use crate::types::{CoinId, Leverage, Price, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An action as requested by the oracle or a manual caller. Field presence and
/// ranges are not guaranteed until parameter validation runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage_of_cash: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage_of_holding: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage_of_margin: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leverage: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_leverage: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn hold() -> Self {
        Self::new("HOLD")
    }

    pub fn coin(mut self, coin: impl Into<String>) -> Self {
        self.coin = Some(coin.into());
        self
    }

    pub fn percentage_of_cash(mut self, pct: Decimal) -> Self {
        self.percentage_of_cash = Some(pct);
        self
    }

    pub fn percentage_of_holding(mut self, pct: Decimal) -> Self {
        self.percentage_of_holding = Some(pct);
        self
    }

    pub fn percentage_of_margin(mut self, pct: Decimal) -> Self {
        self.percentage_of_margin = Some(pct);
        self
    }

    pub fn leverage(mut self, lev: Decimal) -> Self {
        self.leverage = Some(lev);
        self
    }

    pub fn new_leverage(mut self, lev: Decimal) -> Self {
        self.new_leverage = Some(lev);
        self
    }

    pub fn stop_price(mut self, price: Decimal) -> Self {
        self.stop_price = Some(price);
        self
    }

    pub fn target_price(mut self, price: Decimal) -> Self {
        self.target_price = Some(price);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

// 5.1: validated action. every numeric field is already range-checked.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    BuySpot {
        coin: CoinId,
        percentage_of_cash: Decimal,
    },
    SellSpot {
        coin: CoinId,
        percentage_of_holding: Decimal,
    },
    OpenFutures {
        coin: CoinId,
        side: Side,
        percentage_of_cash: Decimal,
        leverage: Leverage,
    },
    CloseFutures {
        coin: CoinId,
        side: Side,
    },
    AddMargin {
        coin: CoinId,
        percentage_of_cash: Decimal,
    },
    ReduceMargin {
        coin: CoinId,
        percentage_of_margin: Decimal,
    },
    IncreaseLeverage {
        coin: CoinId,
        new_leverage: Leverage,
    },
    DecreaseLeverage {
        coin: CoinId,
        new_leverage: Leverage,
    },
    SetStopLoss {
        coin: CoinId,
        stop_price: Price,
        reason: Option<String>,
    },
    SetTakeProfit {
        coin: CoinId,
        target_price: Price,
        reason: Option<String>,
    },
    Hold,
}

impl Action {
    pub fn coin(&self) -> Option<&CoinId> {
        match self {
            Action::BuySpot { coin, .. }
            | Action::SellSpot { coin, .. }
            | Action::OpenFutures { coin, .. }
            | Action::CloseFutures { coin, .. }
            | Action::AddMargin { coin, .. }
            | Action::ReduceMargin { coin, .. }
            | Action::IncreaseLeverage { coin, .. }
            | Action::DecreaseLeverage { coin, .. }
            | Action::SetStopLoss { coin, .. }
            | Action::SetTakeProfit { coin, .. } => Some(coin),
            Action::Hold => None,
        }
    }

    /// The wire tag this action was parsed from.
    pub fn tag(&self) -> &'static str {
        match self {
            Action::BuySpot { .. } => "BUY_SPOT",
            Action::SellSpot { .. } => "SELL_SPOT",
            Action::OpenFutures {
                side: Side::Long, ..
            } => "OPEN_LONG",
            Action::OpenFutures {
                side: Side::Short, ..
            } => "OPEN_SHORT",
            Action::CloseFutures {
                side: Side::Long, ..
            } => "CLOSE_LONG",
            Action::CloseFutures {
                side: Side::Short, ..
            } => "CLOSE_SHORT",
            Action::AddMargin { .. } => "ADD_MARGIN",
            Action::ReduceMargin { .. } => "REDUCE_MARGIN",
            Action::IncreaseLeverage { .. } => "INCREASE_LEVERAGE",
            Action::DecreaseLeverage { .. } => "DECREASE_LEVERAGE",
            Action::SetStopLoss { .. } => "SET_STOP_LOSS",
            Action::SetTakeProfit { .. } => "SET_TAKE_PROFIT",
            Action::Hold => "HOLD",
        }
    }

    /// Actions that take cash out of the free balance.
    pub fn consumes_cash(&self) -> bool {
        matches!(
            self,
            Action::BuySpot { .. } | Action::OpenFutures { .. } | Action::AddMargin { .. }
        )
    }
}

// 5.2: everything that can go wrong validating or executing a single action.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("{action}: missing parameter '{field}'")]
    MissingParameter {
        action: String,
        field: &'static str,
    },
    #[error("invalid '{field}': {detail}")]
    InvalidParameter {
        field: &'static str,
        detail: String,
    },
    #[error("margin ceiling: projected usage {projected} of funds exceeds limit {limit}")]
    MarginCeiling { projected: Decimal, limit: Decimal },
    #[error("cash floor: projected reserve {projected} of funds below minimum {minimum}")]
    CashFloor { projected: Decimal, minimum: Decimal },
    #[error("existing {existing} position on {coin}, refusing to open {requested}")]
    OppositeSideOpen {
        coin: CoinId,
        existing: Side,
        requested: Side,
    },
    #[error("no price available for {0}")]
    PriceUnavailable(CoinId),
    #[error("no {side} position on {coin}")]
    NoPosition { coin: CoinId, side: Side },
    #[error("no spot holding of {0}")]
    NoHolding(CoinId),
    #[error("insufficient cash: need {needed}, have {available}")]
    InsufficientCash { needed: Decimal, available: Decimal },
    #[error("{0}")]
    Rejected(String),
}
