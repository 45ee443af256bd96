//! Engine configuration options.

use crate::risk::RiskLimits;
use crate::types::CoinId;
use crate::valuation::ValuationParams;
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Coins quoted in prompts even before any position exists.
    pub target_coins: Vec<CoinId>,
    /// Price poll / monitor tick interval.
    pub poll_interval: Duration,
    /// Minimum time between oracle rebalances per session.
    pub rebalance_cooldown: Duration,
    /// Periodic snapshot save interval.
    pub save_interval: Duration,
    /// Budget for one oracle chat; past it the tick treats the answer as HOLD.
    pub oracle_timeout: Duration,
    /// Budget for one batch price fetch; past it last-known prices are used.
    pub price_timeout: Duration,
    /// Maximum number of audit events retained in memory.
    pub max_events: usize,
    pub risk_limits: RiskLimits,
    pub valuation: ValuationParams,
    pub snapshot_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_coins: vec![
                CoinId::new("bitcoin"),
                CoinId::new("ethereum"),
                CoinId::new("solana"),
            ],
            poll_interval: Duration::from_secs(2),
            rebalance_cooldown: Duration::from_secs(300),
            save_interval: Duration::from_secs(300),
            oracle_timeout: Duration::from_secs(10),
            price_timeout: Duration::from_secs(10),
            max_events: 100_000,
            risk_limits: RiskLimits::default(),
            valuation: ValuationParams::default(),
            snapshot_path: PathBuf::from("folio_sessions.json"),
        }
    }
}
