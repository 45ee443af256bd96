// 9.0: per-tick monitor. refreshes marks, liquidates underwater positions,
// prunes orphaned pending orders, fires stop/target triggers. runs inside the
// session lock so a tick is atomic with respect to rebalances.
//
// ordering matters: liquidation wins over a stop-loss on the same tick, and a
// liquidated position takes its pending orders with it.

use crate::conditional::OrderKind;
use crate::executor;
use crate::portfolio::{Portfolio, PriceTable};
use crate::types::{CoinId, Price, Side};
use crate::valuation::LIQ_NEVER;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MonitorEvent {
    /// Position forcibly closed; margin is forfeited.
    Liquidated {
        coin: CoinId,
        side: Side,
        mark: Price,
        liquidation_price: Decimal,
        margin_lost: Decimal,
    },
    /// A pending order outlived its position and was dropped.
    OrderOrphaned { coin: CoinId, kind: OrderKind },
    /// A stop or target fired and the position was closed at the mark.
    OrderTriggered {
        coin: CoinId,
        kind: OrderKind,
        side: Side,
        trigger_price: Price,
        mark: Price,
        realized_pnl: Decimal,
    },
}

fn is_liquidatable(mark: Price, side: Side, liquidation_price: Decimal, margin_ratio: Decimal) -> bool {
    if margin_ratio <= Decimal::ONE {
        return true;
    }
    match side {
        Side::Long => liquidation_price < LIQ_NEVER && mark.value() <= liquidation_price,
        Side::Short => liquidation_price > Decimal::ZERO && mark.value() >= liquidation_price,
    }
}

/// One monitor pass over a single portfolio. Returns the events produced so the
/// engine can log and notify; state changes are already applied on return.
pub fn run_tick(portfolio: &mut Portfolio, prices: &PriceTable) -> Vec<MonitorEvent> {
    let mut events = Vec::new();

    portfolio.apply_prices(prices);

    // 9.1: liquidations first.
    let doomed: Vec<CoinId> = portfolio
        .futures_positions
        .iter()
        .filter(|(_, pos)| {
            is_liquidatable(
                pos.current_price,
                pos.side,
                pos.liquidation_price,
                pos.margin_ratio(),
            )
        })
        .map(|(coin, _)| coin.clone())
        .collect();

    for coin in doomed {
        if let Some(pos) = portfolio.futures_positions.remove(&coin) {
            portfolio.margin_used -= pos.margin;
            portfolio.remove_pending_orders(&coin);
            events.push(MonitorEvent::Liquidated {
                coin,
                side: pos.side,
                mark: pos.current_price,
                liquidation_price: pos.liquidation_price,
                margin_lost: pos.margin,
            });
        }
    }

    // 9.2: drop orders whose position no longer exists.
    let orphans: Vec<(CoinId, OrderKind)> = portfolio
        .pending_orders
        .iter()
        .filter(|o| !portfolio.futures_positions.contains_key(&o.coin))
        .map(|o| (o.coin.clone(), o.kind))
        .collect();
    for (coin, kind) in &orphans {
        events.push(MonitorEvent::OrderOrphaned {
            coin: coin.clone(),
            kind: *kind,
        });
    }
    let futures = &portfolio.futures_positions;
    portfolio
        .pending_orders
        .retain(|o| futures.contains_key(&o.coin));

    // 9.3: stop/target triggers against the refreshed marks. the synthesized
    // close bypasses plan-level risk limits: protective exits always run.
    let triggered: Vec<_> = portfolio
        .pending_orders
        .iter()
        .filter_map(|order| {
            let pos = portfolio.futures_positions.get(&order.coin)?;
            order
                .should_trigger(pos.current_price)
                .then(|| (order.clone(), pos.pnl(), pos.current_price))
        })
        .collect();

    for (order, pnl, mark) in triggered {
        let side = order.trigger_action.side();
        // the position can have been closed by an earlier trigger on this tick
        if executor::close_futures(portfolio, &order.coin, side, prices).is_ok() {
            events.push(MonitorEvent::OrderTriggered {
                coin: order.coin,
                kind: order.kind,
                side,
                trigger_price: order.trigger_price,
                mark,
                realized_pnl: pnl,
            });
        }
    }

    portfolio.recompute_funds();
    events
}
