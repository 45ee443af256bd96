// 3.0: position structs. spot holdings with volume-weighted entries, leveraged
// futures positions carrying their own margin and liquidation price.

use crate::types::{Price, Side};
use crate::valuation::{self, ValuationParams};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

// holdings below this many coins are treated as fully sold.
pub const DUST_THRESHOLD: Decimal = dec!(0.000000001);

// 3.1: unleveraged spot holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotPosition {
    pub amount: Decimal,
    pub entry_price: Price,
    pub current_price: Price,
}

impl SpotPosition {
    pub fn open(amount: Decimal, price: Price) -> Self {
        Self {
            amount,
            entry_price: price,
            current_price: price,
        }
    }

    pub fn value(&self) -> Decimal {
        self.amount * self.current_price.value()
    }

    pub fn cost_basis(&self) -> Decimal {
        self.amount * self.entry_price.value()
    }

    pub fn pnl(&self) -> Decimal {
        self.value() - self.cost_basis()
    }

    // volume-weighted entry across repeat buys.
    pub fn buy(&mut self, amount: Decimal, price: Price) {
        let total_cost = self.cost_basis() + amount * price.value();
        let total_amount = self.amount + amount;
        if total_amount > Decimal::ZERO {
            self.entry_price = Price::new_unchecked(total_cost / total_amount);
        }
        self.amount = total_amount;
        self.current_price = price;
    }

    // returns true when the remainder is dust and the holding should be dropped.
    pub fn reduce(&mut self, amount: Decimal) -> bool {
        self.amount -= amount;
        self.amount < DUST_THRESHOLD
    }
}

// 3.2: leveraged futures position. amount is coin quantity (value / entry price),
// never multiplied by leverage. effective leverage = value / margin and can drift
// below 1 after margin adjustments, so it stays a plain Decimal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuturesPosition {
    pub side: Side,
    pub amount: Decimal,
    pub entry_price: Price,
    pub current_price: Price,
    pub margin: Decimal,
    pub leverage: Decimal,
    pub liquidation_price: Decimal,
}

impl FuturesPosition {
    pub fn open(
        side: Side,
        margin: Decimal,
        leverage: Decimal,
        price: Price,
        params: &ValuationParams,
    ) -> Self {
        let value = margin * leverage;
        let amount = value / price.value();
        let liquidation_price =
            valuation::liquidation_price(side, price, amount, leverage, params);
        Self {
            side,
            amount,
            entry_price: price,
            current_price: price,
            margin,
            leverage,
            liquidation_price,
        }
    }

    /// Notional at entry; picks the maintenance tier for the liquidation formula.
    pub fn entry_value(&self) -> Decimal {
        self.amount * self.entry_price.value()
    }

    /// Notional at the current mark.
    pub fn value(&self) -> Decimal {
        self.amount * self.current_price.value()
    }

    pub fn pnl(&self) -> Decimal {
        valuation::futures_pnl(self.side, self.entry_price, self.amount, self.current_price)
    }

    /// Margin plus unrealized pnl. what closing at the current mark would return.
    pub fn equity(&self) -> Decimal {
        self.margin + self.pnl()
    }

    pub fn margin_ratio(&self) -> Decimal {
        valuation::margin_ratio(self.margin, self.value())
    }

    // call after anything that changes entry, margin, or leverage.
    pub fn refresh_liquidation_price(&mut self, params: &ValuationParams) {
        self.liquidation_price = valuation::liquidation_price(
            self.side,
            self.entry_price,
            self.amount,
            self.leverage,
            params,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn spot_vwap_entry() {
        let mut pos = SpotPosition::open(dec!(1), Price::new_unchecked(dec!(100)));
        pos.buy(dec!(1), Price::new_unchecked(dec!(200)));
        assert_eq!(pos.amount, dec!(2));
        assert_eq!(pos.entry_price.value(), dec!(150));
    }

    #[test]
    fn spot_dust_after_full_sell() {
        let mut pos = SpotPosition::open(dec!(0.5), Price::new_unchecked(dec!(100)));
        assert!(!pos.reduce(dec!(0.25)));
        assert!(pos.reduce(dec!(0.25)));
    }

    #[test]
    fn futures_open_derives_amount_from_notional() {
        let params = ValuationParams::default();
        let pos = FuturesPosition::open(
            Side::Long,
            dec!(1000),
            dec!(5),
            Price::new_unchecked(dec!(50000)),
            &params,
        );
        assert_eq!(pos.amount, dec!(0.1));
        assert_eq!(pos.entry_value(), dec!(5000));
        assert_eq!(pos.liquidation_price, dec!(40055.000));
    }

    #[test]
    fn futures_equity_tracks_mark() {
        let params = ValuationParams::default();
        let mut pos = FuturesPosition::open(
            Side::Short,
            dec!(1000),
            dec!(10),
            Price::new_unchecked(dec!(2000)),
            &params,
        );
        pos.current_price = Price::new_unchecked(dec!(1900));
        // 5 coins short, 100 favorable move
        assert_eq!(pos.pnl(), dec!(500));
        assert_eq!(pos.equity(), dec!(1500));
    }
}
