//! Property-based tests for the portfolio math.
//!
//! These verify invariants hold under random inputs.

use folio_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// Strategies for generating test data
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|x| Decimal::new(x, 2)) // $0.01 to $100,000
}

fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000i64).prop_map(|x| Decimal::new(x, 4)) // 0.0001 to 10 coins
}

fn leverage_strategy() -> impl Strategy<Value = Decimal> {
    (1u32..=100u32).prop_map(Decimal::from)
}

fn pct_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=40i64).prop_map(Decimal::from)
}

proptest! {
    /// Unrealized pnl is zero when the mark equals the entry
    #[test]
    fn pnl_zero_at_entry(
        amount in amount_strategy(),
        entry in price_strategy(),
    ) {
        let entry_price = Price::new_unchecked(entry);
        let pnl = valuation::futures_pnl(Side::Long, entry_price, amount, entry_price);
        prop_assert_eq!(pnl, Decimal::ZERO);
    }

    /// Long and short pnl on the same move are exact mirrors
    #[test]
    fn pnl_zero_sum_across_sides(
        amount in amount_strategy(),
        entry in price_strategy(),
        mark in price_strategy(),
    ) {
        let entry_price = Price::new_unchecked(entry);
        let mark_price = Price::new_unchecked(mark);

        let long = valuation::futures_pnl(Side::Long, entry_price, amount, mark_price);
        let short = valuation::futures_pnl(Side::Short, entry_price, amount, mark_price);
        prop_assert_eq!(long + short, Decimal::ZERO);
    }

    /// Pnl scales linearly with the coin amount
    #[test]
    fn pnl_linear_in_amount(
        amount in amount_strategy(),
        entry in price_strategy(),
        mark in price_strategy(),
    ) {
        let entry_price = Price::new_unchecked(entry);
        let mark_price = Price::new_unchecked(mark);

        let one = valuation::futures_pnl(Side::Long, entry_price, amount, mark_price);
        let two = valuation::futures_pnl(Side::Long, entry_price, amount * dec!(2), mark_price);
        prop_assert_eq!(two, one * dec!(2));
    }

    /// Leverage enters pnl only through the amount it buys: same margin at
    /// double the leverage holds double the coins and earns double the pnl
    #[test]
    fn leverage_scales_exposure_not_the_formula(
        margin in (100i64..100_000i64).prop_map(|x| Decimal::new(x, 2)),
        entry in price_strategy(),
        leverage in (1u32..=50u32).prop_map(Decimal::from),
        delta in -500i64..=500i64,
    ) {
        let params = ValuationParams::default();
        let entry_price = Price::new_unchecked(entry);
        let mark_val = entry + Decimal::new(delta, 2);
        prop_assume!(mark_val > Decimal::ZERO);
        let mark = Price::new_unchecked(mark_val);

        let mut low = FuturesPosition::open(Side::Long, margin, leverage, entry_price, &params);
        let mut high =
            FuturesPosition::open(Side::Long, margin, leverage * dec!(2), entry_price, &params);
        low.current_price = mark;
        high.current_price = mark;

        // division rounding keeps these from being bit-exact
        let amount_drift = (high.amount - low.amount * dec!(2)).abs();
        prop_assert!(amount_drift < dec!(0.000001), "amount drifted by {}", amount_drift);
        let pnl_drift = (high.pnl() - low.pnl() * dec!(2)).abs();
        prop_assert!(pnl_drift < dec!(0.0001), "pnl drifted by {}", pnl_drift);
    }

    /// Liquidation price sits below entry for longs and above for shorts,
    /// across the full leverage range
    #[test]
    fn liquidation_price_brackets_entry(
        entry in price_strategy(),
        amount in amount_strategy(),
        leverage in leverage_strategy(),
    ) {
        let params = ValuationParams::default();
        let entry_price = Price::new_unchecked(entry);

        let long = valuation::liquidation_price(Side::Long, entry_price, amount, leverage, &params);
        let short = valuation::liquidation_price(Side::Short, entry_price, amount, leverage, &params);

        prop_assert!(
            long < entry,
            "long liq {} should be < entry {}",
            long,
            entry
        );
        prop_assert!(
            short > entry,
            "short liq {} should be > entry {}",
            short,
            entry
        );
    }

    /// Higher leverage = less room before liquidation
    #[test]
    fn higher_leverage_tighter_liquidation(
        entry in price_strategy(),
        amount in amount_strategy(),
        leverage in (1u32..=50u32).prop_map(Decimal::from),
    ) {
        let params = ValuationParams::default();
        let entry_price = Price::new_unchecked(entry);

        let low = valuation::liquidation_price(Side::Long, entry_price, amount, leverage, &params);
        let high =
            valuation::liquidation_price(Side::Long, entry_price, amount, leverage * dec!(2), &params);

        prop_assert!(
            high > low,
            "liq at {}x ({}) should be closer to entry than at {}x ({})",
            leverage * dec!(2),
            high,
            leverage,
            low
        );
    }

    /// The maintenance rate never shrinks as the position grows
    #[test]
    fn maintenance_rate_monotonic(
        a in (1i64..1_000_000_000i64).prop_map(|x| Decimal::new(x, 2)),
        b in (1i64..1_000_000_000i64).prop_map(|x| Decimal::new(x, 2)),
    ) {
        let (small, large) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            valuation::maintenance_margin_rate(small) <= valuation::maintenance_margin_rate(large)
        );
    }

    /// Buying spot and selling all of it back at the same mark restores cash
    /// up to division rounding
    #[test]
    fn buy_then_sell_all_restores_cash(
        entry in price_strategy(),
        pct in pct_strategy(),
    ) {
        let params = ValuationParams::default();
        let mut p = Portfolio::new("u1", dec!(10000), Timestamp::from_millis(0));
        let mut prices = PriceTable::new();
        prices.insert(CoinId::new("bitcoin"), Price::new_unchecked(entry));

        let buy = Action::BuySpot {
            coin: CoinId::new("bitcoin"),
            percentage_of_cash: pct,
        };
        executor::apply_action(&mut p, &buy, &prices, &params, Timestamp::from_millis(0)).unwrap();

        let sell = Action::SellSpot {
            coin: CoinId::new("bitcoin"),
            percentage_of_holding: dec!(100),
        };
        executor::apply_action(&mut p, &sell, &prices, &params, Timestamp::from_millis(0)).unwrap();

        let drift = (p.cash - dec!(10000)).abs();
        prop_assert!(drift < dec!(0.000001), "cash drifted by {}", drift);
        prop_assert!(p.spot_positions.is_empty());
    }

    /// Any sequence of validated opens leaves margin usage at or under the
    /// ceiling and free cash at or above the floor
    #[test]
    fn validated_opens_respect_limits(
        steps in prop::collection::vec(
            (pct_strategy(), (1u32..=10u32).prop_map(Decimal::from)),
            1..6,
        ),
    ) {
        let limits = RiskLimits::default();
        let params = ValuationParams::default();
        let mut p = Portfolio::new("u1", dec!(10000), Timestamp::from_millis(0));
        let mut prices = PriceTable::new();
        prices.insert(CoinId::new("bitcoin"), Price::new_unchecked(dec!(50000)));

        for (pct, leverage) in steps {
            let request = ActionRequest::new("OPEN_LONG")
                .coin("bitcoin")
                .percentage_of_cash(pct)
                .leverage(leverage);
            // rejected steps are fine; applied ones must leave the account legal
            let _ = transaction::execute_plan(
                &mut p,
                std::slice::from_ref(&request),
                &prices,
                &limits,
                &params,
                Timestamp::from_millis(0),
            );

            prop_assert!(
                p.margin_used <= p.current_funds * limits.max_margin_usage,
                "margin {} over ceiling with funds {}",
                p.margin_used,
                p.current_funds
            );
            prop_assert!(
                p.cash >= p.current_funds * limits.min_cash_reserve,
                "cash {} under floor with funds {}",
                p.cash,
                p.current_funds
            );
        }
    }
}

/// Non-proptest stress scenarios
#[cfg(test)]
mod stress_tests {
    use super::*;

    #[test]
    fn extreme_price_movements() {
        let entry = Price::new_unchecked(dec!(50000));

        // 50% crash on a whole coin
        let crash = Price::new_unchecked(dec!(25000));
        assert_eq!(
            valuation::futures_pnl(Side::Long, entry, dec!(1), crash),
            dec!(-25000)
        );

        // 100% pump
        let pump = Price::new_unchecked(dec!(100000));
        assert_eq!(
            valuation::futures_pnl(Side::Long, entry, dec!(1), pump),
            dec!(50000)
        );
    }

    #[test]
    fn repeated_merges_stay_consistent() {
        let params = ValuationParams::default();
        let limits = RiskLimits {
            max_margin_usage: dec!(1),
            min_cash_reserve: dec!(0),
        };
        let mut p = Portfolio::new("u1", dec!(1000000), Timestamp::from_millis(0));
        let mut prices = PriceTable::new();
        prices.insert(CoinId::new("bitcoin"), Price::new_unchecked(dec!(50000)));

        for _ in 0..50 {
            let request = ActionRequest::new("OPEN_LONG")
                .coin("bitcoin")
                .percentage_of_cash(dec!(1))
                .leverage(dec!(5));
            let outcome = transaction::execute_plan(
                &mut p,
                std::slice::from_ref(&request),
                &prices,
                &limits,
                &params,
                Timestamp::from_millis(0),
            );
            assert!(outcome.is_applied());
        }

        let pos = &p.futures_positions[&CoinId::new("bitcoin")];
        assert!(pos.amount > Decimal::ZERO);
        assert_eq!(pos.margin, p.margin_used);
        // same mark throughout: the merged entry stays at the mark and the
        // account neither creates nor destroys value, up to division rounding
        assert!((pos.entry_price.value() - dec!(50000)).abs() < dec!(0.0001));
        assert!((p.current_funds - dec!(1000000)).abs() < dec!(0.01));
    }

    #[test]
    fn degenerate_leverage_sentinels_are_inert() {
        let params = ValuationParams::default();
        let entry = Price::new_unchecked(dec!(50000));

        let mut long = FuturesPosition::open(Side::Long, dec!(1000), dec!(5), entry, &params);
        long.leverage = Decimal::ZERO;
        long.refresh_liquidation_price(&params);
        assert_eq!(long.liquidation_price, valuation::LIQ_NEVER);

        let mut short = FuturesPosition::open(Side::Short, dec!(1000), dec!(5), entry, &params);
        short.leverage = Decimal::ZERO;
        short.refresh_liquidation_price(&params);
        assert_eq!(short.liquidation_price, Decimal::ZERO);
    }
}
