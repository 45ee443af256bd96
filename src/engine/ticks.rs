// 16.3 engine/ticks.rs: the periodic driver. one tick = fetch prices, then per
// session (under its lock) run the monitor and the rebalance-cooldown check as
// a single atomic unit. rebalances themselves run as detached tasks so a slow
// oracle never stalls the tick loop.

use super::core::Engine;
use crate::events::{ConditionalTriggeredEvent, EventPayload, LiquidationEvent};
use crate::monitor::{self, MonitorEvent};
use crate::types::{CoinId, Timestamp};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

impl Engine {
    /// Main loop. Exits after the current atomic unit when `shutdown` flips,
    /// saving a final snapshot.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut save = tokio::time::interval(self.config.save_interval);
        save.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // intervals fire immediately on the first tick
        poll.tick().await;
        save.tick().await;

        info!(
            sessions = self.session_count(),
            poll_secs = self.config.poll_interval.as_secs(),
            "engine loop started"
        );

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.update_all_sessions().await;
                }
                _ = save.tick() => {
                    if let Err(e) = self.snapshot_all().await {
                        warn!(error = %e, "periodic snapshot failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("shutdown requested, saving final snapshot");
                        if let Err(e) = self.snapshot_all().await {
                            warn!(error = %e, "final snapshot failed");
                        }
                        break;
                    }
                }
            }
        }
    }

    // 16.4: one pass over every session. prices are fetched once for the union
    // of held coins; each session then runs its monitor under its own lock.
    pub async fn update_all_sessions(self: &Arc<Self>) {
        let handles: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        if handles.is_empty() {
            return;
        }

        let mut coins: HashSet<CoinId> = self.config.target_coins.iter().cloned().collect();
        for (_, handle) in &handles {
            coins.extend(handle.lock().await.held_coins());
        }
        let prices = self.fetch_prices(&coins).await;

        let now = Timestamp::now();
        let cooldown_ms = self.config.rebalance_cooldown.as_millis() as i64;

        for (user_id, handle) in handles {
            let mut messages = Vec::new();
            let rebalance_due = {
                let mut portfolio = handle.lock().await;
                for event in monitor::run_tick(&mut portfolio, &prices) {
                    if let Some(message) = self.note_monitor_event(&user_id, &event) {
                        messages.push(message);
                    }
                }

                let elapsed = now.as_millis() - portfolio.last_rebalance_time.as_millis();
                let due = elapsed >= cooldown_ms;
                if due {
                    // stamp inside the lock so overlapping ticks cannot both fire
                    portfolio.last_rebalance_time = now;
                }
                due
            };

            for message in messages {
                self.notifier.notify(&user_id, &message).await;
            }

            if rebalance_due {
                let engine = Arc::clone(self);
                let uid = user_id.clone();
                tokio::spawn(async move {
                    engine.rebalance_session(&uid).await;
                });
            }
        }
    }

    fn note_monitor_event(&self, user_id: &str, event: &MonitorEvent) -> Option<String> {
        match event {
            MonitorEvent::Liquidated {
                coin,
                side,
                mark,
                liquidation_price,
                margin_lost,
            } => {
                self.record_event(EventPayload::Liquidation(LiquidationEvent {
                    user_id: user_id.to_string(),
                    coin: coin.clone(),
                    side: *side,
                    mark: *mark,
                    liquidation_price: *liquidation_price,
                    margin_lost: *margin_lost,
                }));
                Some(format!(
                    "liquidated {side} {coin} at {mark} (trigger {liquidation_price}), margin lost {}",
                    margin_lost.round_dp(2)
                ))
            }
            MonitorEvent::OrderTriggered {
                coin,
                kind,
                side,
                trigger_price,
                realized_pnl,
                ..
            } => {
                self.record_event(EventPayload::ConditionalTriggered(
                    ConditionalTriggeredEvent {
                        user_id: user_id.to_string(),
                        coin: coin.clone(),
                        kind: *kind,
                        side: *side,
                        trigger_price: *trigger_price,
                        realized_pnl: *realized_pnl,
                    },
                ));
                Some(format!(
                    "{kind:?} hit on {side} {coin} at {trigger_price}, closed with pnl {}",
                    realized_pnl.round_dp(2)
                ))
            }
            MonitorEvent::OrderOrphaned { coin, kind } => {
                debug!(user_id, %coin, ?kind, "dropped orphaned pending order");
                None
            }
        }
    }
}
