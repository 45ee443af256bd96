//! End-to-end session walkthroughs with hand-checked numbers.
//!
//! Each test chains validation, execution, monitoring, and settlement the way
//! the engine drives them, and asserts the concrete account values at every
//! stage.

use folio_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn btc() -> CoinId {
    CoinId::new("bitcoin")
}

fn table(pairs: &[(&str, Decimal)]) -> PriceTable {
    pairs
        .iter()
        .map(|(coin, value)| (CoinId::new(*coin), Price::new_unchecked(*value)))
        .collect()
}

fn submit(portfolio: &mut Portfolio, request: ActionRequest, prices: &PriceTable) -> PlanOutcome {
    transaction::execute_plan(
        portfolio,
        std::slice::from_ref(&request),
        prices,
        &RiskLimits::default(),
        &ValuationParams::default(),
        Timestamp::from_millis(0),
    )
}

// a 5x long on 10% of a fresh 10k account, the reference position:
// margin 1000, notional 5000, 0.1 coin, liquidation at 40055
fn open_reference_long(portfolio: &mut Portfolio, prices: &PriceTable) {
    let outcome = submit(
        portfolio,
        ActionRequest::new("OPEN_LONG")
            .coin("bitcoin")
            .percentage_of_cash(dec!(10))
            .leverage(dec!(5)),
        prices,
    );
    assert!(outcome.is_applied());
}

#[test]
fn leveraged_long_has_the_expected_shape() {
    let mut p = Portfolio::new("u1", dec!(10000), Timestamp::from_millis(0));
    let prices = table(&[("bitcoin", dec!(50000))]);
    open_reference_long(&mut p, &prices);

    let pos = &p.futures_positions[&btc()];
    assert_eq!(pos.margin, dec!(1000));
    assert_eq!(pos.entry_value(), dec!(5000));
    assert_eq!(pos.amount, dec!(0.1));
    assert_eq!(pos.liquidation_price, dec!(40055.000));
    assert_eq!(p.cash, dec!(9000));
    assert_eq!(p.margin_used, dec!(1000));
    // opening moves cash to margin, the account is worth the same
    assert_eq!(p.current_funds, dec!(10000));
}

#[test]
fn crash_through_liquidation_forfeits_margin() {
    let mut p = Portfolio::new("u1", dec!(10000), Timestamp::from_millis(0));
    open_reference_long(&mut p, &table(&[("bitcoin", dec!(50000))]));

    // 40000 is through the 40055 trigger
    let events = monitor::run_tick(&mut p, &table(&[("bitcoin", dec!(40000))]));

    assert_eq!(events.len(), 1);
    match &events[0] {
        MonitorEvent::Liquidated {
            margin_lost,
            liquidation_price,
            ..
        } => {
            assert_eq!(*margin_lost, dec!(1000));
            assert_eq!(*liquidation_price, dec!(40055.000));
        }
        other => panic!("expected liquidation, got {other:?}"),
    }
    assert!(p.futures_positions.is_empty());
    assert_eq!(p.margin_used, Decimal::ZERO);
    assert_eq!(p.current_funds, dec!(9000));
}

#[test]
fn thin_margin_liquidates_without_a_price_cross() {
    let params = ValuationParams::default();
    let mut p = Portfolio::new("u1", dec!(10000), Timestamp::from_millis(0));
    let mut pos = FuturesPosition::open(
        Side::Long,
        dec!(1000),
        dec!(5),
        Price::new_unchecked(dec!(50000)),
        &params,
    );
    // drain the margin below maintenance (25 on a 5000 notional) while the
    // price trigger stays inert
    pos.margin = dec!(20);
    pos.liquidation_price = valuation::LIQ_NEVER;
    p.cash -= dec!(20);
    p.margin_used += dec!(20);
    p.futures_positions.insert(btc(), pos);
    p.recompute_funds();

    let events = monitor::run_tick(&mut p, &table(&[("bitcoin", dec!(50000))]));
    assert!(matches!(events[0], MonitorEvent::Liquidated { .. }));
    assert!(p.futures_positions.is_empty());
}

#[test]
fn stop_loss_lifecycle() {
    let mut p = Portfolio::new("u1", dec!(10000), Timestamp::from_millis(0));
    let prices = table(&[("bitcoin", dec!(50000))]);
    open_reference_long(&mut p, &prices);

    // a stop above the mark is the wrong side for a long
    let outcome = submit(
        &mut p,
        ActionRequest::new("SET_STOP_LOSS")
            .coin("bitcoin")
            .stop_price(dec!(52000)),
        &prices,
    );
    assert!(!outcome.is_applied());
    assert!(p.pending_orders.is_empty());

    let outcome = submit(
        &mut p,
        ActionRequest::new("SET_STOP_LOSS")
            .coin("bitcoin")
            .stop_price(dec!(48000)),
        &prices,
    );
    assert!(outcome.is_applied());
    assert_eq!(p.pending_orders.len(), 1);

    // above the stop: nothing fires
    let events = monitor::run_tick(&mut p, &table(&[("bitcoin", dec!(48500))]));
    assert!(events.is_empty());

    // through the stop: closed at the mark, 0.1 coin 2500 against
    let events = monitor::run_tick(&mut p, &table(&[("bitcoin", dec!(47500))]));
    match &events[0] {
        MonitorEvent::OrderTriggered {
            kind,
            realized_pnl,
            ..
        } => {
            assert_eq!(*kind, OrderKind::StopLoss);
            assert_eq!(*realized_pnl, dec!(-250));
        }
        other => panic!("expected trigger, got {other:?}"),
    }
    assert!(p.futures_positions.is_empty());
    assert!(p.pending_orders.is_empty());
    assert_eq!(p.cash, dec!(9750));
    assert_eq!(p.current_funds, dec!(9750));
}

#[test]
fn replacing_an_order_keeps_one_per_kind() {
    let mut p = Portfolio::new("u1", dec!(10000), Timestamp::from_millis(0));
    let prices = table(&[("bitcoin", dec!(50000))]);
    open_reference_long(&mut p, &prices);

    for stop in [dec!(48000), dec!(47000), dec!(46000)] {
        let outcome = submit(
            &mut p,
            ActionRequest::new("SET_STOP_LOSS")
                .coin("bitcoin")
                .stop_price(stop),
            &prices,
        );
        assert!(outcome.is_applied());
    }
    let outcome = submit(
        &mut p,
        ActionRequest::new("SET_TAKE_PROFIT")
            .coin("bitcoin")
            .target_price(dec!(60000)),
        &prices,
    );
    assert!(outcome.is_applied());

    assert_eq!(p.pending_orders.len(), 2);
    let stop = p.pending_order(&btc(), OrderKind::StopLoss).unwrap();
    assert_eq!(stop.trigger_price.value(), dec!(46000));
}

#[test]
fn liquidation_wins_over_a_stop_on_the_same_tick() {
    let mut p = Portfolio::new("u1", dec!(10000), Timestamp::from_millis(0));
    let prices = table(&[("bitcoin", dec!(50000))]);
    open_reference_long(&mut p, &prices);
    let outcome = submit(
        &mut p,
        ActionRequest::new("SET_STOP_LOSS")
            .coin("bitcoin")
            .stop_price(dec!(48000)),
        &prices,
    );
    assert!(outcome.is_applied());

    // one tick carries the mark through both the stop and the liquidation
    // price; the position is liquidated, not stop-closed
    let events = monitor::run_tick(&mut p, &table(&[("bitcoin", dec!(40000))]));
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], MonitorEvent::Liquidated { .. }));
    assert!(p.pending_orders.is_empty());
    // margin forfeited in full, no stop-close proceeds
    assert_eq!(p.cash, dec!(9000));
}

#[test]
fn margin_withdrawal_beyond_profit_is_rejected() {
    let mut p = Portfolio::new("u1", dec!(10000), Timestamp::from_millis(0));
    open_reference_long(&mut p, &table(&[("bitcoin", dec!(50000))]));

    // the rally puts 200 of profit on the position; half the margin is 500
    let rally = table(&[("bitcoin", dec!(52000))]);
    let outcome = submit(
        &mut p,
        ActionRequest::new("REDUCE_MARGIN")
            .coin("bitcoin")
            .percentage_of_margin(dec!(50)),
        &rally,
    );
    assert!(!outcome.is_applied());

    let pos = &p.futures_positions[&btc()];
    assert_eq!(pos.margin, dec!(1000));
    assert_eq!(p.margin_used, dec!(1000));
    assert_eq!(p.cash, dec!(9000));
}

#[test]
fn settlement_closes_the_books() {
    let mut p = Portfolio::new("u1", dec!(10000), Timestamp::from_millis(0));
    let prices = table(&[("ethereum", dec!(2000)), ("bitcoin", dec!(50000))]);

    let outcome = submit(
        &mut p,
        ActionRequest::new("BUY_SPOT")
            .coin("ethereum")
            .percentage_of_cash(dec!(30)),
        &prices,
    );
    assert!(outcome.is_applied());

    // 10% of the 7000 left: margin 700, 0.07 coin
    let outcome = submit(
        &mut p,
        ActionRequest::new("OPEN_LONG")
            .coin("bitcoin")
            .percentage_of_cash(dec!(10))
            .leverage(dec!(5)),
        &prices,
    );
    assert!(outcome.is_applied());

    // ethereum up 20%, bitcoin up 2000
    let marks = table(&[("ethereum", dec!(2400)), ("bitcoin", dec!(52000))]);
    let report = settlement::settle(&mut p, &marks, Timestamp::from_millis(3_600_000));

    // 1.5 eth gains 600; 0.07 btc gains 140
    assert_eq!(report.spot_pnl, dec!(600));
    assert_eq!(report.futures_pnl, dec!(140));
    assert_eq!(report.total_pnl, dec!(740));
    assert_eq!(report.final_funds, dec!(10740));
    assert_eq!(report.return_pct, dec!(7.4));
    assert_eq!(report.duration_secs, 3600);

    assert!(p.spot_positions.is_empty());
    assert!(p.futures_positions.is_empty());
    assert_eq!(p.cash, dec!(10740));
    assert_eq!(p.margin_used, Decimal::ZERO);
}

#[test]
fn full_session_walkthrough() {
    let mut p = Portfolio::new("u1", dec!(10000), Timestamp::from_millis(0));
    let prices = table(&[("bitcoin", dec!(50000)), ("ethereum", dec!(2000))]);

    // oracle hands down an opening plan
    let plan = RebalancePlan::from_oracle_text(
        r#"```json
{
  "analysis": "risk-on",
  "market_direction": "bullish",
  "confidence_level": "high",
  "actions": [
    {"action": "BUY_SPOT", "coin": "ethereum", "percentage_of_cash": 20},
    {"action": "OPEN_LONG", "coin": "bitcoin", "percentage_of_cash": 10, "leverage": 5},
    {"action": "SET_STOP_LOSS", "coin": "bitcoin", "stop_price": 45000}
  ]
}
```"#,
    );
    assert_eq!(plan.market_direction, "bullish");
    let outcome = transaction::execute_plan(
        &mut p,
        &plan.actions,
        &prices,
        &RiskLimits::default(),
        &ValuationParams::default(),
        Timestamp::from_millis(0),
    );
    assert!(outcome.is_applied());
    assert_eq!(p.cash, dec!(7200));

    // quiet tick, then a rally that lets margin come off the long
    assert!(monitor::run_tick(&mut p, &prices).is_empty());
    let rally = table(&[("bitcoin", dec!(52000)), ("ethereum", dec!(2100))]);
    assert!(monitor::run_tick(&mut p, &rally).is_empty());

    // 20% of the 800 margin is exactly the 160 of profit the rally produced
    let outcome = submit(
        &mut p,
        ActionRequest::new("REDUCE_MARGIN")
            .coin("bitcoin")
            .percentage_of_margin(dec!(20)),
        &rally,
    );
    assert!(outcome.is_applied());

    // the pullback takes out the stop but spares the spot holding
    let pullback = table(&[("bitcoin", dec!(44500)), ("ethereum", dec!(2050))]);
    let events = monitor::run_tick(&mut p, &pullback);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        MonitorEvent::OrderTriggered {
            kind: OrderKind::StopLoss,
            ..
        }
    ));
    assert!(p.futures_positions.is_empty());
    assert_eq!(p.spot_positions.len(), 1);
    assert_eq!(p.margin_used, Decimal::ZERO);

    let report = settlement::settle(&mut p, &pullback, Timestamp::from_millis(86_400_000));
    assert_eq!(report.duration_secs, 86400);
    assert_eq!(report.final_funds, p.cash);
    assert_eq!(report.final_funds, p.current_funds);
    // the account survived the round trip with its sign intact
    assert!(report.final_funds > dec!(9000));
}
