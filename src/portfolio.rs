// 4.0: portfolio state. one per user session: cash, spot holdings, leveraged
// futures, pending conditional orders. serializable wholesale so the snapshot
// store and the transaction rollback can both treat it as a value.

use crate::conditional::{OrderKind, PendingOrder};
use crate::position::{FuturesPosition, SpotPosition};
use crate::types::{CoinId, Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Latest known price per coin. Consumers fall back to a position's stored
/// `current_price` when a coin is missing from the table.
pub type PriceTable = HashMap<CoinId, Price>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub user_id: String,
    pub initial_funds: Decimal,
    /// Free cash, not committed to any position.
    pub cash: Decimal,
    /// Sum of margin across all open futures positions.
    pub margin_used: Decimal,
    /// Mark-to-market account value; recomputed after every mutation.
    pub current_funds: Decimal,
    pub spot_positions: HashMap<CoinId, SpotPosition>,
    pub futures_positions: HashMap<CoinId, FuturesPosition>,
    pub pending_orders: Vec<PendingOrder>,
    pub start_time: Timestamp,
    pub last_rebalance_time: Timestamp,
    /// Provider id pinned on first oracle contact so a long-running session
    /// keeps talking to the same provider.
    pub oracle_session_ref: Option<String>,
}

impl Portfolio {
    pub fn new(user_id: impl Into<String>, initial_funds: Decimal, now: Timestamp) -> Self {
        Self {
            user_id: user_id.into(),
            initial_funds,
            cash: initial_funds,
            margin_used: Decimal::ZERO,
            current_funds: initial_funds,
            spot_positions: HashMap::new(),
            futures_positions: HashMap::new(),
            pending_orders: Vec::new(),
            start_time: now,
            last_rebalance_time: now,
            oracle_session_ref: None,
        }
    }

    // 4.1: cash + spot value + (margin + unrealized futures pnl).
    pub fn total_assets(&self) -> Decimal {
        let spot: Decimal = self.spot_positions.values().map(|p| p.value()).sum();
        let futures_pnl: Decimal = self.futures_positions.values().map(|p| p.pnl()).sum();
        self.cash + spot + self.margin_used + futures_pnl
    }

    pub fn recompute_funds(&mut self) {
        self.current_funds = self.total_assets();
    }

    pub fn spot_pnl(&self) -> Decimal {
        self.spot_positions.values().map(|p| p.pnl()).sum()
    }

    pub fn futures_pnl(&self) -> Decimal {
        self.futures_positions.values().map(|p| p.pnl()).sum()
    }

    pub fn return_pct(&self) -> Decimal {
        if self.initial_funds.is_zero() {
            return Decimal::ZERO;
        }
        (self.current_funds - self.initial_funds) / self.initial_funds * Decimal::ONE_HUNDRED
    }

    pub fn held_coins(&self) -> HashSet<CoinId> {
        self.spot_positions
            .keys()
            .chain(self.futures_positions.keys())
            .cloned()
            .collect()
    }

    /// Push fresh marks onto every position. Coins absent from the table keep
    /// their last known price.
    pub fn apply_prices(&mut self, prices: &PriceTable) {
        for (coin, pos) in &mut self.spot_positions {
            if let Some(price) = prices.get(coin) {
                pos.current_price = *price;
            }
        }
        for (coin, pos) in &mut self.futures_positions {
            if let Some(price) = prices.get(coin) {
                pos.current_price = *price;
            }
        }
    }

    // 4.2: one pending order per (coin, kind); setting again replaces.
    pub fn set_pending_order(&mut self, order: PendingOrder) {
        self.pending_orders
            .retain(|o| !(o.coin == order.coin && o.kind == order.kind));
        self.pending_orders.push(order);
    }

    pub fn remove_pending_orders(&mut self, coin: &CoinId) {
        self.pending_orders.retain(|o| &o.coin != coin);
    }

    pub fn pending_order(&self, coin: &CoinId, kind: OrderKind) -> Option<&PendingOrder> {
        self.pending_orders
            .iter()
            .find(|o| &o.coin == coin && o.kind == kind)
    }
}
