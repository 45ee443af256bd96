// 10.5: typed oracle plans, decoded from schema-validated JSON. construction
// from oracle text is total: a response that cannot be used becomes the HOLD
// (or all-defaults) fallback, never an error.

use crate::action::ActionRequest;
use crate::schema;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

fn hold_actions() -> Vec<ActionRequest> {
    vec![ActionRequest::hold()]
}

fn neutral() -> String {
    "neutral".to_string()
}

fn medium() -> String {
    "medium".to_string()
}

fn short_term() -> String {
    "short_term".to_string()
}

/// Periodic rebalance decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalancePlan {
    #[serde(default)]
    pub analysis: String,
    #[serde(default = "neutral")]
    pub market_direction: String,
    #[serde(default = "medium")]
    pub confidence_level: String,
    #[serde(default = "short_term")]
    pub time_horizon: String,
    #[serde(default = "hold_actions")]
    pub actions: Vec<ActionRequest>,
}

impl RebalancePlan {
    pub fn hold() -> Self {
        Self {
            analysis: String::new(),
            market_direction: neutral(),
            confidence_level: medium(),
            time_horizon: short_term(),
            actions: hold_actions(),
        }
    }

    pub fn from_oracle_text(text: &str) -> Self {
        let value = schema::parse_response(text, &schema::rebalance_schema());
        serde_json::from_value(value).unwrap_or_else(|_| Self::hold())
    }

    /// True when the plan would not touch the portfolio.
    pub fn is_hold_only(&self) -> bool {
        self.actions.is_empty()
            || self
                .actions
                .iter()
                .all(|a| a.action.eq_ignore_ascii_case("HOLD"))
    }
}

/// Initial allocation when a session opens: the opening actions to attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyPlan {
    #[serde(default)]
    pub analysis: String,
    #[serde(default = "hold_actions")]
    pub actions: Vec<ActionRequest>,
}

impl StrategyPlan {
    pub fn conservative() -> Self {
        Self {
            analysis: String::new(),
            actions: hold_actions(),
        }
    }

    pub fn from_oracle_text(text: &str) -> Self {
        let value = schema::parse_response(text, &schema::strategy_schema());
        serde_json::from_value(value).unwrap_or_else(|_| Self::conservative())
    }
}

/// Post-settlement performance review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReview {
    #[serde(default)]
    pub analysis: String,
    #[serde(default = "PerformanceReview::default_rating")]
    pub rating: Decimal,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub key_learnings: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl PerformanceReview {
    fn default_rating() -> Decimal {
        dec!(5)
    }

    pub fn from_oracle_text(text: &str) -> Self {
        let value = schema::parse_response(text, &schema::performance_schema());
        serde_json::from_value(value).unwrap_or_else(|_| Self {
            analysis: String::new(),
            rating: Self::default_rating(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            key_learnings: Vec::new(),
            suggestions: Vec::new(),
        })
    }
}
