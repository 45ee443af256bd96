//! Conditional orders: stop-loss and take-profit attached to futures positions.
//!
//! Pending orders are stored on the portfolio and checked by the monitor on every
//! price tick. This lets the account manage downside without constant rebalancing.

use crate::types::{CoinId, Price, Side, Timestamp};
use serde::{Deserialize, Serialize};

/// Kind of conditional order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Triggers when price falls to the stop (for longs) or rises to it (for shorts).
    StopLoss,
    /// Triggers when price rises to the target (for longs) or falls to it (for shorts).
    TakeProfit,
}

/// The close action synthesized when a pending order fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerAction {
    CloseLong,
    CloseShort,
}

impl TriggerAction {
    pub fn for_side(side: Side) -> Self {
        match side {
            Side::Long => TriggerAction::CloseLong,
            Side::Short => TriggerAction::CloseShort,
        }
    }

    pub fn side(&self) -> Side {
        match self {
            TriggerAction::CloseLong => Side::Long,
            TriggerAction::CloseShort => Side::Short,
        }
    }
}

/// A pending order waiting on a price trigger. At most one per (coin, kind);
/// setting a new one replaces the old.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub kind: OrderKind,
    pub coin: CoinId,
    pub position_side: Side,
    pub trigger_price: Price,
    pub trigger_action: TriggerAction,
    pub reason: Option<String>,
    pub created_at: Timestamp,
}

impl PendingOrder {
    pub fn stop_loss(
        coin: CoinId,
        position_side: Side,
        trigger_price: Price,
        reason: Option<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            kind: OrderKind::StopLoss,
            coin,
            position_side,
            trigger_price,
            trigger_action: TriggerAction::for_side(position_side),
            reason,
            created_at: timestamp,
        }
    }

    pub fn take_profit(
        coin: CoinId,
        position_side: Side,
        trigger_price: Price,
        reason: Option<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            kind: OrderKind::TakeProfit,
            coin,
            position_side,
            trigger_price,
            trigger_action: TriggerAction::for_side(position_side),
            reason,
            created_at: timestamp,
        }
    }

    /// Whether the current price satisfies the trigger condition.
    pub fn should_trigger(&self, current: Price) -> bool {
        let trigger = self.trigger_price;
        match (self.kind, self.position_side) {
            (OrderKind::StopLoss, Side::Long) => current <= trigger,
            (OrderKind::StopLoss, Side::Short) => current >= trigger,
            (OrderKind::TakeProfit, Side::Long) => current >= trigger,
            (OrderKind::TakeProfit, Side::Short) => current <= trigger,
        }
    }

    /// Side-validity of the trigger price against the live mark. A long's stop
    /// must sit below the mark and its target above; mirrored for shorts.
    pub fn is_price_valid(kind: OrderKind, side: Side, trigger: Price, mark: Price) -> bool {
        match (kind, side) {
            (OrderKind::StopLoss, Side::Long) => trigger < mark,
            (OrderKind::StopLoss, Side::Short) => trigger > mark,
            (OrderKind::TakeProfit, Side::Long) => trigger > mark,
            (OrderKind::TakeProfit, Side::Short) => trigger < mark,
        }
    }
}
