// 16.0: async engine. coordinates session lifecycle, price ticks, monitor
// passes, oracle rebalances, and persistence. one lock per session portfolio;
// a tick, a rebalance, and a manual action on the same session serialize.

mod config;
mod core;
mod rebalance;
mod results;
mod ticks;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{EngineError, FinishResult};
