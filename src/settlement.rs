// 9.5: settlement. closes everything at the current marks and produces the
// final report. the oracle's performance review is layered on top by the
// engine; this module is pure portfolio math.

use crate::portfolio::{Portfolio, PriceTable};
use crate::types::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReport {
    pub user_id: String,
    pub initial_funds: Decimal,
    pub final_funds: Decimal,
    /// Realized pnl from spot holdings, at settlement marks.
    pub spot_pnl: Decimal,
    /// Realized pnl from futures positions, at settlement marks.
    pub futures_pnl: Decimal,
    pub total_pnl: Decimal,
    pub return_pct: Decimal,
    pub duration_secs: i64,
}

/// Mark-to-market close of every position. Cash absorbs spot value and futures
/// equity; pending orders are void once their positions are gone.
pub fn settle(portfolio: &mut Portfolio, prices: &PriceTable, now: Timestamp) -> SettlementReport {
    portfolio.apply_prices(prices);

    let spot_pnl = portfolio.spot_pnl();
    let futures_pnl = portfolio.futures_pnl();

    let spot_proceeds: Decimal = portfolio.spot_positions.values().map(|p| p.value()).sum();
    let futures_proceeds: Decimal = portfolio
        .futures_positions
        .values()
        .map(|p| p.equity())
        .sum();

    portfolio.cash += spot_proceeds + futures_proceeds;
    portfolio.margin_used = Decimal::ZERO;
    portfolio.spot_positions.clear();
    portfolio.futures_positions.clear();
    portfolio.pending_orders.clear();
    portfolio.recompute_funds();

    SettlementReport {
        user_id: portfolio.user_id.clone(),
        initial_funds: portfolio.initial_funds,
        final_funds: portfolio.current_funds,
        spot_pnl,
        futures_pnl,
        total_pnl: portfolio.current_funds - portfolio.initial_funds,
        return_pct: portfolio.return_pct(),
        duration_secs: portfolio.start_time.elapsed_secs(&now),
    }
}
