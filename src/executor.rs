// 7.0: action executor. one handler per action tag, each a pure mutation of the
// portfolio given a price table. risk limits are NOT checked here: callers run
// risk::validate_portfolio_risk first. the monitor also calls straight into
// close_futures when a trigger fires, deliberately skipping plan-level limits.

use crate::action::{Action, ActionError};
use crate::conditional::{OrderKind, PendingOrder};
use crate::portfolio::{Portfolio, PriceTable};
use crate::position::{FuturesPosition, SpotPosition};
use crate::types::{CoinId, Price, Side, Timestamp};
use crate::valuation::{self, ValuationParams};
use rust_decimal::Decimal;

// 7.1: mark resolution. fresh table entry first, then the position's last mark.
fn resolve_price(
    coin: &CoinId,
    prices: &PriceTable,
    portfolio: &Portfolio,
) -> Result<Price, ActionError> {
    if let Some(p) = prices.get(coin) {
        return Ok(*p);
    }
    if let Some(pos) = portfolio.futures_positions.get(coin) {
        return Ok(pos.current_price);
    }
    if let Some(pos) = portfolio.spot_positions.get(coin) {
        return Ok(pos.current_price);
    }
    Err(ActionError::PriceUnavailable(coin.clone()))
}

/// Apply one validated action. Returns a human-readable summary on success.
/// Recomputes `current_funds` before returning.
pub fn apply_action(
    portfolio: &mut Portfolio,
    action: &Action,
    prices: &PriceTable,
    params: &ValuationParams,
    now: Timestamp,
) -> Result<String, ActionError> {
    let summary = match action {
        Action::BuySpot {
            coin,
            percentage_of_cash,
        } => buy_spot(portfolio, coin, *percentage_of_cash, prices)?,
        Action::SellSpot {
            coin,
            percentage_of_holding,
        } => sell_spot(portfolio, coin, *percentage_of_holding, prices)?,
        Action::OpenFutures {
            coin,
            side,
            percentage_of_cash,
            leverage,
        } => open_futures(
            portfolio,
            coin,
            *side,
            *percentage_of_cash,
            leverage.value(),
            prices,
            params,
        )?,
        Action::CloseFutures { coin, side } => close_futures(portfolio, coin, *side, prices)?,
        Action::AddMargin {
            coin,
            percentage_of_cash,
        } => add_margin(portfolio, coin, *percentage_of_cash, prices, params)?,
        Action::ReduceMargin {
            coin,
            percentage_of_margin,
        } => reduce_margin(portfolio, coin, *percentage_of_margin, prices, params)?,
        Action::IncreaseLeverage { coin, new_leverage } => {
            change_leverage(portfolio, coin, new_leverage.value(), true, prices, params)?
        }
        Action::DecreaseLeverage { coin, new_leverage } => {
            change_leverage(portfolio, coin, new_leverage.value(), false, prices, params)?
        }
        Action::SetStopLoss {
            coin,
            stop_price,
            reason,
        } => set_conditional(
            portfolio,
            coin,
            OrderKind::StopLoss,
            *stop_price,
            reason.clone(),
            prices,
            now,
        )?,
        Action::SetTakeProfit {
            coin,
            target_price,
            reason,
        } => set_conditional(
            portfolio,
            coin,
            OrderKind::TakeProfit,
            *target_price,
            reason.clone(),
            prices,
            now,
        )?,
        Action::Hold => "holding".to_string(),
    };
    portfolio.recompute_funds();
    Ok(summary)
}

fn buy_spot(
    portfolio: &mut Portfolio,
    coin: &CoinId,
    pct: Decimal,
    prices: &PriceTable,
) -> Result<String, ActionError> {
    let price = resolve_price(coin, prices, portfolio)?;
    let spend = portfolio.cash * pct / Decimal::ONE_HUNDRED;
    if spend <= Decimal::ZERO {
        return Ok(format!("buy of {coin} skipped: computed spend is zero"));
    }
    let amount = spend / price.value();
    match portfolio.spot_positions.get_mut(coin) {
        Some(pos) => pos.buy(amount, price),
        None => {
            portfolio
                .spot_positions
                .insert(coin.clone(), SpotPosition::open(amount, price));
        }
    }
    portfolio.cash -= spend;
    Ok(format!(
        "bought {} {} at {} for {}",
        amount.round_dp(8),
        coin,
        price,
        spend.round_dp(2)
    ))
}

fn sell_spot(
    portfolio: &mut Portfolio,
    coin: &CoinId,
    pct: Decimal,
    prices: &PriceTable,
) -> Result<String, ActionError> {
    let price = resolve_price(coin, prices, portfolio)?;
    let pos = portfolio
        .spot_positions
        .get_mut(coin)
        .ok_or_else(|| ActionError::NoHolding(coin.clone()))?;
    pos.current_price = price;
    let sell_amount = pos.amount * pct / Decimal::ONE_HUNDRED;
    let proceeds = sell_amount * price.value();
    let emptied = pos.reduce(sell_amount);
    if emptied {
        portfolio.spot_positions.remove(coin);
    }
    portfolio.cash += proceeds;
    Ok(format!(
        "sold {} {} at {} for {}",
        sell_amount.round_dp(8),
        coin,
        price,
        proceeds.round_dp(2)
    ))
}

// 7.2: open/merge. repeated same-side opens merge into one position with a
// value-weighted entry; effective leverage becomes combined value / combined
// margin. the risk phase rejects opposite-side opens too, but the handler
// re-checks: the monitor path reaches it without plan-level validation.
fn open_futures(
    portfolio: &mut Portfolio,
    coin: &CoinId,
    side: Side,
    pct: Decimal,
    leverage: Decimal,
    prices: &PriceTable,
    params: &ValuationParams,
) -> Result<String, ActionError> {
    if let Some(pos) = portfolio.futures_positions.get(coin) {
        if pos.side != side {
            return Err(ActionError::OppositeSideOpen {
                coin: coin.clone(),
                existing: pos.side,
                requested: side,
            });
        }
    }
    let price = resolve_price(coin, prices, portfolio)?;
    let margin = portfolio.cash * pct / Decimal::ONE_HUNDRED;
    if margin <= Decimal::ZERO {
        return Ok(format!(
            "open of {side} {coin} skipped: computed margin is zero"
        ));
    }

    match portfolio.futures_positions.get_mut(coin) {
        Some(pos) => {
            let added_value = margin * leverage;
            let added_amount = added_value / price.value();
            let total_value = pos.entry_value() + added_value;
            let total_amount = pos.amount + added_amount;
            let total_margin = pos.margin + margin;

            pos.entry_price = Price::new_unchecked(total_value / total_amount);
            pos.current_price = price;
            pos.amount = total_amount;
            pos.margin = total_margin;
            pos.leverage = total_value / total_margin;
            pos.refresh_liquidation_price(params);
        }
        None => {
            let pos = FuturesPosition::open(side, margin, leverage, price, params);
            portfolio.futures_positions.insert(coin.clone(), pos);
        }
    }

    portfolio.cash -= margin;
    portfolio.margin_used += margin;
    Ok(format!(
        "opened {} {} with {} margin at {} ({}x)",
        side,
        coin,
        margin.round_dp(2),
        price,
        leverage
    ))
}

/// Close a futures position and credit margin plus pnl back to cash. Also used
/// directly by the monitor when a stop or target fires.
pub fn close_futures(
    portfolio: &mut Portfolio,
    coin: &CoinId,
    side: Side,
    prices: &PriceTable,
) -> Result<String, ActionError> {
    let has_match = portfolio
        .futures_positions
        .get(coin)
        .map(|p| p.side == side)
        .unwrap_or(false);
    if !has_match {
        return Err(ActionError::NoPosition {
            coin: coin.clone(),
            side,
        });
    }
    let price = resolve_price(coin, prices, portfolio)?;

    // unwrap-free: presence checked above, remove returns it
    let mut pos = match portfolio.futures_positions.remove(coin) {
        Some(p) => p,
        None => {
            return Err(ActionError::NoPosition {
                coin: coin.clone(),
                side,
            })
        }
    };
    pos.current_price = price;
    let pnl = pos.pnl();
    let returned = pos.margin + pnl;

    portfolio.cash += returned;
    portfolio.margin_used -= pos.margin;
    portfolio.remove_pending_orders(coin);

    Ok(format!(
        "closed {} {} at {}: pnl {}, returned {}",
        side,
        coin,
        price,
        pnl.round_dp(2),
        returned.round_dp(2)
    ))
}

fn add_margin(
    portfolio: &mut Portfolio,
    coin: &CoinId,
    pct: Decimal,
    prices: &PriceTable,
    params: &ValuationParams,
) -> Result<String, ActionError> {
    let price = resolve_price(coin, prices, portfolio)?;
    let add = portfolio.cash * pct / Decimal::ONE_HUNDRED;
    let pos = portfolio
        .futures_positions
        .get_mut(coin)
        .ok_or_else(|| ActionError::NoPosition {
            coin: coin.clone(),
            side: Side::Long,
        })?;
    if add <= Decimal::ZERO {
        return Ok(format!("margin top-up on {coin} skipped: computed amount is zero"));
    }

    pos.current_price = price;
    pos.margin += add;
    // more margin behind the same notional lowers effective leverage,
    // possibly below 1
    pos.leverage = pos.entry_value() / pos.margin;
    pos.refresh_liquidation_price(params);

    portfolio.cash -= add;
    portfolio.margin_used += add;
    Ok(format!(
        "added {} margin to {} {}, leverage now {}",
        add.round_dp(2),
        pos.side,
        coin,
        pos.leverage.round_dp(2)
    ))
}

// 7.3: margin may only be withdrawn out of unrealized profit. a request for
// more than the profit is rejected, and the remaining margin must stay above
// the maintenance requirement at the current mark.
fn reduce_margin(
    portfolio: &mut Portfolio,
    coin: &CoinId,
    pct: Decimal,
    prices: &PriceTable,
    params: &ValuationParams,
) -> Result<String, ActionError> {
    let price = resolve_price(coin, prices, portfolio)?;
    let pos = portfolio
        .futures_positions
        .get_mut(coin)
        .ok_or_else(|| ActionError::NoPosition {
            coin: coin.clone(),
            side: Side::Long,
        })?;

    pos.current_price = price;
    let pnl = pos.pnl();
    if pnl <= Decimal::ZERO {
        return Err(ActionError::Rejected(format!(
            "margin on {coin} can only be reduced out of unrealized profit (pnl {pnl})"
        )));
    }

    let withdraw = pos.margin * pct / Decimal::ONE_HUNDRED;
    if withdraw <= Decimal::ZERO {
        return Ok(format!(
            "margin withdrawal on {coin} skipped: computed amount is zero"
        ));
    }
    if withdraw > pnl {
        return Err(ActionError::Rejected(format!(
            "withdrawing {withdraw} from {coin} exceeds the unrealized profit {pnl}"
        )));
    }
    let new_margin = pos.margin - withdraw;
    let required = valuation::maintenance_margin(pos.value());
    if new_margin < required {
        return Err(ActionError::Rejected(format!(
            "reducing margin on {coin} to {new_margin} would breach the maintenance requirement {required}"
        )));
    }

    pos.margin = new_margin;
    pos.leverage = pos.entry_value() / pos.margin;
    pos.refresh_liquidation_price(params);

    portfolio.cash += withdraw;
    portfolio.margin_used -= withdraw;
    Ok(format!(
        "withdrew {} margin from {}, leverage now {}",
        withdraw.round_dp(2),
        coin,
        pos.leverage.round_dp(2)
    ))
}

// 7.4: leverage changes re-target margin so that margin * leverage equals the
// notional at the current mark. increase releases margin, decrease locks more.
fn change_leverage(
    portfolio: &mut Portfolio,
    coin: &CoinId,
    new_leverage: Decimal,
    increase: bool,
    prices: &PriceTable,
    params: &ValuationParams,
) -> Result<String, ActionError> {
    let price = resolve_price(coin, prices, portfolio)?;
    let available_cash = portfolio.cash;
    let pos = portfolio
        .futures_positions
        .get_mut(coin)
        .ok_or_else(|| ActionError::NoPosition {
            coin: coin.clone(),
            side: Side::Long,
        })?;
    pos.current_price = price;

    if increase && new_leverage <= pos.leverage {
        return Err(ActionError::Rejected(format!(
            "new leverage {new_leverage} must exceed current {}",
            pos.leverage.round_dp(2)
        )));
    }
    if !increase && new_leverage >= pos.leverage {
        return Err(ActionError::Rejected(format!(
            "new leverage {new_leverage} must be below current {}",
            pos.leverage.round_dp(2)
        )));
    }

    let new_margin = pos.value() / new_leverage;

    if increase {
        let projected_liq = valuation::liquidation_price(
            pos.side,
            pos.entry_price,
            pos.amount,
            new_leverage,
            params,
        );
        let breached = match pos.side {
            Side::Long => price.value() <= projected_liq,
            Side::Short => price.value() >= projected_liq,
        };
        if breached {
            return Err(ActionError::Rejected(format!(
                "leverage {new_leverage} puts the liquidation price at {projected_liq}, already crossed"
            )));
        }
        let released = pos.margin - new_margin;
        pos.margin = new_margin;
        pos.leverage = new_leverage;
        pos.refresh_liquidation_price(params);
        portfolio.cash += released;
        portfolio.margin_used -= released;
        Ok(format!(
            "raised {coin} leverage to {new_leverage}x, released {} margin",
            released.round_dp(2)
        ))
    } else {
        let needed = new_margin - pos.margin;
        if needed > available_cash {
            return Err(ActionError::InsufficientCash {
                needed,
                available: available_cash,
            });
        }
        pos.margin = new_margin;
        pos.leverage = new_leverage;
        pos.refresh_liquidation_price(params);
        portfolio.cash -= needed;
        portfolio.margin_used += needed;
        Ok(format!(
            "lowered {coin} leverage to {new_leverage}x, locked {} more margin",
            needed.round_dp(2)
        ))
    }
}

fn set_conditional(
    portfolio: &mut Portfolio,
    coin: &CoinId,
    kind: OrderKind,
    trigger: Price,
    reason: Option<String>,
    prices: &PriceTable,
    now: Timestamp,
) -> Result<String, ActionError> {
    let price = resolve_price(coin, prices, portfolio)?;
    let side = portfolio
        .futures_positions
        .get(coin)
        .map(|p| p.side)
        .ok_or_else(|| ActionError::NoPosition {
            coin: coin.clone(),
            side: Side::Long,
        })?;

    if !PendingOrder::is_price_valid(kind, side, trigger, price) {
        let expectation = match (kind, side) {
            (OrderKind::StopLoss, Side::Long) | (OrderKind::TakeProfit, Side::Short) => "below",
            _ => "above",
        };
        return Err(ActionError::Rejected(format!(
            "trigger {trigger} must be {expectation} the current price {price} for a {side} position"
        )));
    }

    let order = match kind {
        OrderKind::StopLoss => PendingOrder::stop_loss(coin.clone(), side, trigger, reason, now),
        OrderKind::TakeProfit => {
            PendingOrder::take_profit(coin.clone(), side, trigger, reason, now)
        }
    };
    portfolio.set_pending_order(order);

    let label = match kind {
        OrderKind::StopLoss => "stop loss",
        OrderKind::TakeProfit => "take profit",
    };
    Ok(format!("set {label} on {side} {coin} at {trigger}"))
}
