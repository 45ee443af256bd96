// 16.0.2: result types and errors for engine operations.

use crate::action::ActionError;
use crate::oracle::OracleError;
use crate::plan::PerformanceReview;
use crate::price_feed::PriceFeedError;
use crate::settlement::SettlementReport;
use crate::store::StoreError;
use rust_decimal::Decimal;

/// Outcome of closing out a session.
#[derive(Debug, Clone)]
pub struct FinishResult {
    pub report: SettlementReport,
    /// Oracle review of the run; None when no provider answered in time.
    pub review: Option<PerformanceReview>,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("session '{0}' already exists")]
    SessionExists(String),

    #[error("initial funds must be positive, got {0}")]
    InvalidFunds(Decimal),

    #[error("action failed: {0}")]
    Action(#[from] ActionError),

    #[error("price feed error: {0}")]
    PriceFeed(#[from] PriceFeedError),

    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("snapshot store error: {0}")]
    Store(#[from] StoreError),
}
