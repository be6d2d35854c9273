//! Swap Executor - cross-chain swap and bridge execution engine
//!
//! Turns a resolved swap or bridge request into an on-chain outcome: quotes
//! are fanned out to several liquidity sources, executed best-first under an
//! escalating slippage bound with approvals gated on the current allowance,
//! and cross-chain transfers are followed until the destination settles.

pub mod api;
pub mod bridge;
pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod http;
pub mod metrics;
pub mod progress;
pub mod quotes;
pub mod tokens;
pub mod tx;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{BridgeRequest, BridgeResult, Settlement, SwapEngine, SwapRequest, TransactionResult};
pub use error::{EngineError, EngineResult, ErrorClass};
pub use progress::{ProgressEvent, ProgressSender};
