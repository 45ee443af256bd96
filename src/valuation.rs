// 2.0: valuation math. pnl, maintenance margin tiers, margin ratio, liquidation price.
// all pure functions over Decimal so every caller (executor, monitor, tests) agrees
// on the same numbers.

use crate::types::{Price, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

// sentinel for "this position cannot be liquidated by price" (degenerate leverage).
pub const LIQ_NEVER: Decimal = Decimal::MAX;

/// Parameters shared by liquidation-price and margin-ratio computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationParams {
    /// Taker fee rate folded into the liquidation price.
    pub fee_rate: Decimal,
}

impl Default for ValuationParams {
    fn default() -> Self {
        Self {
            fee_rate: dec!(0.0005),
        }
    }
}

// 2.1: unrealized pnl. amount is the coin quantity (value / entry), so leverage
// never re-enters here. the leverage effect is already baked into the amount a
// given margin controls.
pub fn futures_pnl(side: Side, entry: Price, amount: Decimal, current: Price) -> Decimal {
    match side {
        Side::Long => (current.value() - entry.value()) * amount,
        Side::Short => (entry.value() - current.value()) * amount,
    }
}

// 2.2: maintenance margin rate tiers by position value.
pub fn maintenance_margin_rate(position_value: Decimal) -> Decimal {
    if position_value <= dec!(50_000) {
        dec!(0.005)
    } else if position_value <= dec!(200_000) {
        dec!(0.008)
    } else {
        dec!(0.012)
    }
}

pub fn maintenance_margin(position_value: Decimal) -> Decimal {
    position_value * maintenance_margin_rate(position_value)
}

// 2.3: margin / maintenance requirement. healthy well above 1, liquidatable at <= 1.
pub fn margin_ratio(margin: Decimal, position_value: Decimal) -> Decimal {
    let required = maintenance_margin(position_value);
    if required <= Decimal::ZERO {
        return Decimal::MAX;
    }
    margin / required
}

// 2.4: liquidation price from entry and leverage.
//   long:  entry * (1 - (1 - mmr - fee) / leverage)
//   short: entry * (1 + (1 - mmr - fee) / leverage)
// the mmr tier is picked from the entry-time position value. leverage at or
// below zero means the position cannot be liquidated by price crossing; the
// monitor treats LIQ_NEVER (long) and 0 (short) as inert.
pub fn liquidation_price(
    side: Side,
    entry: Price,
    amount: Decimal,
    leverage: Decimal,
    params: &ValuationParams,
) -> Decimal {
    if leverage <= Decimal::ZERO {
        return match side {
            Side::Long => LIQ_NEVER,
            Side::Short => Decimal::ZERO,
        };
    }
    let mmr = maintenance_margin_rate(amount * entry.value());
    let step = (Decimal::ONE - mmr - params.fee_rate) / leverage;
    match side {
        Side::Long => entry.value() * (Decimal::ONE - step),
        Side::Short => entry.value() * (Decimal::ONE + step),
    }
}
