// 16.0 engine/core.rs: main engine. holds all sessions and the collaborator
// handles. every portfolio lives behind its own tokio mutex; a monitor tick, a
// rebalance, and a manual action on the same session serialize on that lock.

use super::config::EngineConfig;
use super::results::{EngineError, FinishResult};
use crate::action::ActionRequest;
use crate::events::{
    EventCollector, EventPayload, ManualActionEvent, SessionOpenedEvent, SessionSettledEvent,
};
use crate::executor;
use crate::notify::NotificationSink;
use crate::oracle::{self, OracleRouter};
use crate::plan::{PerformanceReview, StrategyPlan};
use crate::portfolio::{Portfolio, PriceTable};
use crate::price_feed::MarketDataSource;
use crate::risk;
use crate::settlement;
use crate::store::SnapshotStore;
use crate::types::{CoinId, Timestamp};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

type SessionHandle = Arc<tokio::sync::Mutex<Portfolio>>;

pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) sessions: DashMap<String, SessionHandle>,
    pub(super) market_data: Arc<dyn MarketDataSource>,
    pub(super) oracle: Arc<OracleRouter>,
    pub(super) notifier: Arc<dyn NotificationSink>,
    pub(super) store: SnapshotStore,
    pub(super) events: Mutex<EventCollector>,
    /// Last successful quotes, the fallback when a fetch times out.
    pub(super) last_prices: Mutex<PriceTable>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        market_data: Arc<dyn MarketDataSource>,
        oracle: Arc<OracleRouter>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let store = SnapshotStore::new(&config.snapshot_path);
        Self {
            config,
            sessions: DashMap::new(),
            market_data,
            oracle,
            notifier,
            store,
            events: Mutex::new(EventCollector::new()),
            last_prices: Mutex::new(PriceTable::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Restore sessions persisted by a previous run.
    pub async fn load_sessions(&self) -> Result<usize, EngineError> {
        let sessions = self.store.load().await?;
        let count = sessions.len();
        for (user_id, portfolio) in sessions {
            self.sessions
                .insert(user_id, Arc::new(tokio::sync::Mutex::new(portfolio)));
        }
        if count > 0 {
            info!(count, "restored sessions from snapshot");
        }
        Ok(count)
    }

    pub(super) fn session_handle(&self, user_id: &str) -> Result<SessionHandle, EngineError> {
        self.sessions
            .get(user_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::SessionNotFound(user_id.to_string()))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub(super) fn record_event(&self, payload: EventPayload) {
        if let Ok(mut events) = self.events.lock() {
            events.record(Timestamp::now(), payload, self.config.max_events);
        }
    }

    pub fn recent_events(&self, count: usize) -> Vec<crate::events::Event> {
        self.events
            .lock()
            .map(|events| events.recent(count).to_vec())
            .unwrap_or_default()
    }

    // 16.1: price fetch with timeout and last-known fallback. fresh quotes are
    // merged over the cached table so a partial answer never blanks out coins
    // the source skipped.
    pub(super) async fn fetch_prices(&self, coins: &HashSet<CoinId>) -> PriceTable {
        let mut table = self
            .last_prices
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default();

        match timeout(self.config.price_timeout, self.market_data.get_prices(coins)).await {
            Ok(Ok(fresh)) => {
                table.extend(fresh);
                if let Ok(mut cache) = self.last_prices.lock() {
                    *cache = table.clone();
                }
            }
            Ok(Err(e)) => warn!(error = %e, "price fetch failed, using last known prices"),
            Err(_) => warn!("price fetch timed out, using last known prices"),
        }
        table
    }

    // 16.2: session lifecycle.

    /// Open a session and apply the oracle's initial allocation best-effort:
    /// each suggested action is validated and applied independently, and a
    /// failing one is skipped rather than aborting the open.
    pub async fn open_session(
        &self,
        user_id: &str,
        initial_funds: Decimal,
    ) -> Result<(), EngineError> {
        if initial_funds <= Decimal::ZERO {
            return Err(EngineError::InvalidFunds(initial_funds));
        }
        if self.sessions.contains_key(user_id) {
            return Err(EngineError::SessionExists(user_id.to_string()));
        }

        let now = Timestamp::now();
        let mut portfolio = Portfolio::new(user_id, initial_funds, now);

        let coins: HashSet<CoinId> = self.config.target_coins.iter().cloned().collect();
        let prices = self.fetch_prices(&coins).await;

        match self.oracle.resolve(None) {
            Ok(provider) => {
                portfolio.oracle_session_ref = Some(provider.id().to_string());
                let prompt = oracle::build_strategy_prompt(initial_funds, &prices);
                match timeout(
                    self.config.oracle_timeout,
                    provider.chat(oracle::SYSTEM_PROMPT, &prompt),
                )
                .await
                {
                    Ok(Ok(text)) => {
                        let plan = StrategyPlan::from_oracle_text(&text);
                        self.apply_best_effort(&mut portfolio, &plan.actions, &prices, now);
                    }
                    Ok(Err(e)) => warn!(user_id, error = %e, "initial allocation skipped"),
                    Err(_) => warn!(user_id, "initial allocation timed out"),
                }
            }
            Err(e) => warn!(user_id, error = %e, "no oracle provider for initial allocation"),
        }

        self.record_event(EventPayload::SessionOpened(SessionOpenedEvent {
            user_id: user_id.to_string(),
            initial_funds,
        }));
        self.sessions.insert(
            user_id.to_string(),
            Arc::new(tokio::sync::Mutex::new(portfolio)),
        );
        if let Err(e) = self.snapshot_all().await {
            warn!(error = %e, "snapshot after open failed");
        }
        self.notifier
            .notify(user_id, &format!("session opened with {initial_funds} USD"))
            .await;
        Ok(())
    }

    fn apply_best_effort(
        &self,
        portfolio: &mut Portfolio,
        actions: &[ActionRequest],
        prices: &PriceTable,
        now: Timestamp,
    ) {
        for request in actions {
            let applied = risk::validate_parameters(request).and_then(|action| {
                risk::validate_portfolio_risk(&action, portfolio, &self.config.risk_limits)?;
                executor::apply_action(portfolio, &action, prices, &self.config.valuation, now)
            });
            match applied {
                Ok(summary) => debug!(user_id = %portfolio.user_id, %summary, "allocation step"),
                Err(e) => debug!(user_id = %portfolio.user_id, error = %e, "allocation step skipped"),
            }
        }
    }

    /// Settle everything at current marks, ask the oracle for a review, and
    /// drop the session.
    pub async fn finish_session(&self, user_id: &str) -> Result<FinishResult, EngineError> {
        let handle = self.session_handle(user_id)?;

        let (coins, pinned) = {
            let portfolio = handle.lock().await;
            (portfolio.held_coins(), portfolio.oracle_session_ref.clone())
        };
        let prices = self.fetch_prices(&coins).await;

        let report = {
            let mut portfolio = handle.lock().await;
            settlement::settle(&mut portfolio, &prices, Timestamp::now())
        };

        let review = self.request_review(&report, pinned.as_deref()).await;

        self.sessions.remove(user_id);
        self.record_event(EventPayload::SessionSettled(SessionSettledEvent {
            user_id: user_id.to_string(),
            final_funds: report.final_funds,
            return_pct: report.return_pct,
        }));
        if let Err(e) = self.snapshot_all().await {
            warn!(error = %e, "snapshot after settlement failed");
        }
        self.notifier
            .notify(
                user_id,
                &format!(
                    "session settled: {} USD ({}% return)",
                    report.final_funds.round_dp(2),
                    report.return_pct.round_dp(2)
                ),
            )
            .await;

        Ok(FinishResult { report, review })
    }

    async fn request_review(
        &self,
        report: &settlement::SettlementReport,
        pinned: Option<&str>,
    ) -> Option<PerformanceReview> {
        let provider = match self.oracle.resolve(pinned) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "no oracle provider for review");
                return None;
            }
        };
        let prompt = oracle::build_performance_prompt(report);
        match timeout(
            self.config.oracle_timeout,
            provider.chat(oracle::SYSTEM_PROMPT, &prompt),
        )
        .await
        {
            Ok(Ok(text)) => Some(PerformanceReview::from_oracle_text(&text)),
            Ok(Err(e)) => {
                warn!(error = %e, "review request failed");
                None
            }
            Err(_) => {
                warn!("review request timed out");
                None
            }
        }
    }

    /// Read-only snapshot of one session.
    pub async fn session_status(&self, user_id: &str) -> Result<Portfolio, EngineError> {
        let handle = self.session_handle(user_id)?;
        let portfolio = handle.lock().await;
        Ok(portfolio.clone())
    }

    /// One validated action outside any plan, atomic under the session lock.
    pub async fn manual_action(
        &self,
        user_id: &str,
        request: &ActionRequest,
    ) -> Result<String, EngineError> {
        let handle = self.session_handle(user_id)?;

        let coins = {
            let mut wanted: HashSet<CoinId> = handle.lock().await.held_coins();
            if let Some(coin) = &request.coin {
                wanted.insert(CoinId::new(coin.trim()));
            }
            wanted
        };
        let prices = self.fetch_prices(&coins).await;

        let summary = {
            let mut portfolio = handle.lock().await;
            let action = risk::validate_parameters(request)?;
            risk::validate_portfolio_risk(&action, &portfolio, &self.config.risk_limits)?;
            executor::apply_action(
                &mut portfolio,
                &action,
                &prices,
                &self.config.valuation,
                Timestamp::now(),
            )?
        };

        self.record_event(EventPayload::ManualAction(ManualActionEvent {
            user_id: user_id.to_string(),
            action: request.action.clone(),
            summary: summary.clone(),
        }));
        Ok(summary)
    }

    /// Persist every live session.
    pub async fn snapshot_all(&self) -> Result<(), EngineError> {
        let handles: Vec<(String, SessionHandle)> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut sessions = HashMap::with_capacity(handles.len());
        for (user_id, handle) in handles {
            let portfolio = handle.lock().await;
            sessions.insert(user_id, portfolio.clone());
        }
        self.store.save(&sessions).await?;
        Ok(())
    }
}
