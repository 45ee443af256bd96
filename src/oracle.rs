// 13.0: the decision oracle. an external model that answers free-text prompts;
// the engine asks it for an initial allocation, periodic rebalance plans, and a
// post-settlement review. providers are interchangeable behind DecisionOracle,
// and the router pins a session to one provider for its whole lifetime.

use crate::portfolio::{Portfolio, PriceTable};
use crate::settlement::SettlementReport;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("no oracle providers configured")]
    NoProviders,
    #[error("oracle provider '{0}' not available")]
    ProviderNotFound(String),
    #[error("oracle call failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait DecisionOracle: Send + Sync {
    fn id(&self) -> &str;

    /// One prompt, one free-text answer. Callers run the answer through the
    /// schema layer; transport failures surface here.
    async fn chat(&self, system_prompt: &str, prompt: &str) -> Result<String, OracleError>;
}

// 13.1: provider resolution. pinned session id first, then the configured
// preference order, then whatever is available.
pub struct OracleRouter {
    providers: Vec<Arc<dyn DecisionOracle>>,
    preferred: Vec<String>,
}

impl OracleRouter {
    pub fn new(providers: Vec<Arc<dyn DecisionOracle>>, preferred: Vec<String>) -> Self {
        Self {
            providers,
            preferred,
        }
    }

    pub fn single(provider: Arc<dyn DecisionOracle>) -> Self {
        Self {
            providers: vec![provider],
            preferred: Vec::new(),
        }
    }

    fn by_id(&self, id: &str) -> Option<Arc<dyn DecisionOracle>> {
        self.providers
            .iter()
            .find(|p| p.id() == id)
            .map(Arc::clone)
    }

    /// Resolve the provider for a session. A pinned id that is no longer
    /// registered is an error rather than a silent switch.
    pub fn resolve(&self, pinned: Option<&str>) -> Result<Arc<dyn DecisionOracle>, OracleError> {
        if let Some(id) = pinned {
            return self
                .by_id(id)
                .ok_or_else(|| OracleError::ProviderNotFound(id.to_string()));
        }
        for id in &self.preferred {
            if let Some(provider) = self.by_id(id) {
                return Ok(provider);
            }
        }
        self.providers
            .first()
            .map(Arc::clone)
            .ok_or(OracleError::NoProviders)
    }
}

// 13.2: prompt construction. english prose plus a JSON snapshot; the response
// format instructions match what schema.rs expects back.

pub const SYSTEM_PROMPT: &str = "You are a disciplined crypto portfolio manager \
for a simulated leveraged account. You answer with a single JSON object and \
nothing else. You never exceed the risk limits stated in the prompt.";

fn portfolio_snapshot(portfolio: &Portfolio) -> serde_json::Value {
    let spot: Vec<_> = portfolio
        .spot_positions
        .iter()
        .map(|(coin, pos)| {
            json!({
                "coin": coin.as_str(),
                "amount": pos.amount,
                "entry_price": pos.entry_price.value(),
                "current_price": pos.current_price.value(),
                "pnl": pos.pnl(),
            })
        })
        .collect();
    let futures: Vec<_> = portfolio
        .futures_positions
        .iter()
        .map(|(coin, pos)| {
            json!({
                "coin": coin.as_str(),
                "side": pos.side.to_string(),
                "amount": pos.amount,
                "entry_price": pos.entry_price.value(),
                "current_price": pos.current_price.value(),
                "margin": pos.margin,
                "leverage": pos.leverage.round_dp(2),
                "liquidation_price": pos.liquidation_price,
                "pnl": pos.pnl(),
            })
        })
        .collect();
    let orders: Vec<_> = portfolio
        .pending_orders
        .iter()
        .map(|o| {
            json!({
                "kind": format!("{:?}", o.kind),
                "coin": o.coin.as_str(),
                "trigger_price": o.trigger_price.value(),
            })
        })
        .collect();

    json!({
        "initial_funds": portfolio.initial_funds,
        "current_funds": portfolio.current_funds,
        "cash": portfolio.cash,
        "margin_used": portfolio.margin_used,
        "return_pct": portfolio.return_pct().round_dp(2),
        "spot_positions": spot,
        "futures_positions": futures,
        "pending_orders": orders,
    })
}

fn market_context(prices: &PriceTable) -> serde_json::Value {
    let quotes: Vec<_> = prices
        .iter()
        .map(|(coin, price)| json!({ "coin": coin.as_str(), "usd": price.value() }))
        .collect();
    json!({ "prices": quotes })
}

const RISK_RULES: &str = "Rules: total futures margin must stay at or below 25% \
of account value; free cash must stay at or above 10% of account value; \
leverage between 1 and 100; never open against an existing position on the \
same coin.";

pub fn build_rebalance_prompt(portfolio: &Portfolio, prices: &PriceTable) -> String {
    format!(
        "Review the portfolio and decide on rebalancing actions.\n\n\
         Portfolio:\n{}\n\nMarket:\n{}\n\n{}\n\n\
         Respond with one JSON object: {{\"analysis\": string, \
         \"market_direction\": \"bullish\"|\"bearish\"|\"neutral\", \
         \"confidence_level\": \"low\"|\"medium\"|\"high\", \
         \"time_horizon\": \"short_term\"|\"medium_term\"|\"long_term\", \
         \"actions\": [{{\"action\": TAG, ...params}}]}}. \
         Valid tags: BUY_SPOT, SELL_SPOT, OPEN_LONG, OPEN_SHORT, CLOSE_LONG, \
         CLOSE_SHORT, ADD_MARGIN, REDUCE_MARGIN, INCREASE_LEVERAGE, \
         DECREASE_LEVERAGE, SET_STOP_LOSS, SET_TAKE_PROFIT, HOLD.",
        portfolio_snapshot(portfolio),
        market_context(prices),
        RISK_RULES,
    )
}

pub fn build_strategy_prompt(
    initial_funds: Decimal,
    prices: &PriceTable,
) -> String {
    format!(
        "A new account opens with {initial_funds} USD in cash. Propose an \
         initial allocation.\n\nMarket:\n{}\n\n{}\n\n\
         Respond with one JSON object: {{\"analysis\": string, \
         \"actions\": [{{\"action\": TAG, ...params}}]}}. \
         Valid tags: BUY_SPOT, OPEN_LONG, OPEN_SHORT, SET_STOP_LOSS, \
         SET_TAKE_PROFIT, HOLD.",
        market_context(prices),
        RISK_RULES,
    )
}

pub fn build_performance_prompt(report: &SettlementReport) -> String {
    format!(
        "The session has settled. Review the result.\n\nResult:\n{}\n\n\
         Respond with one JSON object: {{\"analysis\": string, \
         \"rating\": number 0-10, \"strengths\": [string], \
         \"weaknesses\": [string], \"key_learnings\": [string], \
         \"suggestions\": [string]}}.",
        serde_json::to_string_pretty(report).unwrap_or_default(),
    )
}

// 13.3: scripted provider for simulations and tests.
pub struct ScriptedOracle {
    id: String,
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedOracle {
    pub fn new(id: impl Into<String>, responses: Vec<String>) -> Self {
        Self {
            id: id.into(),
            responses: Mutex::new(responses.into()),
        }
    }

    pub fn always_hold(id: impl Into<String>) -> Self {
        Self::new(id, Vec::new())
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    fn id(&self) -> &str {
        &self.id
    }

    async fn chat(&self, _system_prompt: &str, _prompt: &str) -> Result<String, OracleError> {
        let mut queue = self
            .responses
            .lock()
            .map_err(|_| OracleError::Transport("script queue poisoned".to_string()))?;
        Ok(queue
            .pop_front()
            .unwrap_or_else(|| r#"{"actions": [{"action": "HOLD"}]}"#.to_string()))
    }
}
