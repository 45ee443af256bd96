// 16.5 engine/rebalance.rs: the oracle consultation. runs as a detached task
// spawned by the tick loop; the session lock is held only around state reads
// and the plan application, never across the network calls.

use super::core::Engine;
use super::results::EngineError;
use crate::events::{EventPayload, PlanAppliedEvent, PlanRolledBackEvent};
use crate::oracle;
use crate::plan::RebalancePlan;
use crate::transaction::{self, PlanOutcome};
use crate::types::{CoinId, Timestamp};
use std::collections::HashSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

impl Engine {
    pub(super) async fn rebalance_session(&self, user_id: &str) {
        if let Err(e) = self.try_rebalance(user_id).await {
            warn!(user_id, error = %e, "rebalance failed");
        }
    }

    async fn try_rebalance(&self, user_id: &str) -> Result<(), EngineError> {
        let handle = self.session_handle(user_id)?;

        let (coins, pinned) = {
            let portfolio = handle.lock().await;
            let mut coins: HashSet<CoinId> = self.config.target_coins.iter().cloned().collect();
            coins.extend(portfolio.held_coins());
            (coins, portfolio.oracle_session_ref.clone())
        };
        let prices = self.fetch_prices(&coins).await;

        let prompt = {
            let portfolio = handle.lock().await;
            oracle::build_rebalance_prompt(&portfolio, &prices)
        };

        let provider = self.oracle.resolve(pinned.as_deref())?;

        // an unresponsive oracle degrades to HOLD, it never blocks the session
        let text = match timeout(
            self.config.oracle_timeout,
            provider.chat(oracle::SYSTEM_PROMPT, &prompt),
        )
        .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                info!(user_id, error = %e, "oracle unavailable, holding");
                return Ok(());
            }
            Err(_) => {
                info!(user_id, "oracle timed out, holding");
                return Ok(());
            }
        };

        let plan = RebalancePlan::from_oracle_text(&text);
        debug!(
            user_id,
            direction = %plan.market_direction,
            confidence = %plan.confidence_level,
            actions = plan.actions.len(),
            "rebalance plan received"
        );

        let outcome = {
            let mut portfolio = handle.lock().await;
            if portfolio.oracle_session_ref.is_none() {
                portfolio.oracle_session_ref = Some(provider.id().to_string());
            }
            if plan.is_hold_only() {
                return Ok(());
            }
            transaction::execute_plan(
                &mut portfolio,
                &plan.actions,
                &prices,
                &self.config.risk_limits,
                &self.config.valuation,
                Timestamp::now(),
            )
        };

        match &outcome {
            PlanOutcome::Applied { steps } => {
                self.record_event(EventPayload::PlanApplied(PlanAppliedEvent {
                    user_id: user_id.to_string(),
                    action_count: steps.len(),
                    market_direction: plan.market_direction.clone(),
                }));
                let lines: Vec<&str> = steps.iter().map(|s| s.summary.as_str()).collect();
                self.notifier
                    .notify(
                        user_id,
                        &format!("rebalanced ({}): {}", plan.market_direction, lines.join("; ")),
                    )
                    .await;
            }
            PlanOutcome::RolledBack { failure, .. } => {
                self.record_event(EventPayload::PlanRolledBack(PlanRolledBackEvent {
                    user_id: user_id.to_string(),
                    failed_action: failure.request.action.clone(),
                    reason: failure.error.to_string(),
                }));
                self.notifier
                    .notify(
                        user_id,
                        &format!(
                            "rebalance rolled back at {}: {}",
                            failure.request.action, failure.error
                        ),
                    )
                    .await;
            }
        }

        if let Err(e) = self.snapshot_all().await {
            warn!(user_id, error = %e, "snapshot after rebalance failed");
        }
        Ok(())
    }
}
