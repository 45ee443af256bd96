// folio-core: simulated leveraged crypto portfolio engine.
// risk-first architecture: margin math and liquidation take priority.
// portfolio math is deterministic; I/O lives behind traits at the edges.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: CoinId, Side, Price, Leverage, Timestamp
//   2.x  valuation.rs: pnl, maintenance tiers, margin ratio, liquidation price
//   3.x  position.rs: spot and futures position structs
//   4.x  portfolio.rs: per-session account state, price table
//   5.x  action.rs: action requests, validated actions, errors
//   6.x  risk.rs: parameter validation + account-level limits
//   7.x  executor.rs: one handler per action tag
//   8.x  transaction.rs: all-or-nothing plan execution with rollback
//   9.x  monitor.rs: per-tick liquidations and conditional triggers
//   9.5  settlement.rs: mark-to-market close-out and final report
//   10.x schema.rs: oracle JSON extraction + declarative validation
//   10.5 plan.rs: typed rebalance/strategy/review plans
//   11.x events.rs: state transition events for audit
//   12.x price_feed.rs: market data sources (CoinGecko + static)
//   13.x oracle.rs: decision oracle trait, provider routing, prompts
//   14.x notify.rs: fire-and-forget notification sinks
//   15.x store.rs: JSON snapshot persistence
//   16.x engine/: async engine: ticks, rebalances, session lifecycle

// portfolio math
pub mod action;
pub mod conditional;
pub mod portfolio;
pub mod position;
pub mod types;
pub mod valuation;

// decision and execution
pub mod executor;
pub mod monitor;
pub mod plan;
pub mod risk;
pub mod schema;
pub mod settlement;
pub mod transaction;

// integration modules
pub mod engine;
pub mod events;
pub mod notify;
pub mod oracle;
pub mod price_feed;
pub mod store;

// re exports for convenience
pub use action::*;
pub use conditional::*;
pub use engine::*;
pub use events::*;
pub use monitor::*;
pub use portfolio::*;
pub use position::*;
pub use risk::*;
pub use settlement::*;
pub use transaction::*;
pub use types::*;
pub use valuation::*;
pub use oracle::{DecisionOracle, OracleError, OracleRouter, ScriptedOracle};
pub use plan::{PerformanceReview, RebalancePlan, StrategyPlan};
pub use price_feed::{CoinGeckoSource, MarketDataSource, PriceFeedError, StaticPriceSource};
pub use notify::{FnSink, LogSink, NotificationSink};
pub use store::{SnapshotStore, StoreError};
