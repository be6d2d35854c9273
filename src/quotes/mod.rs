//! Quote model, the liquidity-source seam and the fan-out aggregator
//!
//! Every source returns a `Quote` whose `min_output_amount` is in base units of
//! the destination token; that is the only field the ranking looks at.
//! `raw_route` is whatever the source needs later to build its transaction.

mod aggregator;
pub mod sources;

pub use aggregator::QuoteAggregator;

use crate::chain::TxRequest;
use crate::error::EngineResult;

use async_trait::async_trait;
use ethers::types::{Address, U256};
use serde::Serialize;

/// Slippage bound in basis points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Slippage(u32);

impl Slippage {
    pub const fn from_bps(bps: u32) -> Self {
        Self(bps)
    }

    pub fn bps(&self) -> u32 {
        self.0
    }

    /// As a fraction, e.g. 0.015 for 150 bps
    pub fn as_fraction(&self) -> f64 {
        self.0 as f64 / 10_000.0
    }

    /// As a percentage, e.g. 1.5 for 150 bps
    pub fn as_percent(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Lowest acceptable output for an expected amount
    pub fn min_output(&self, expected: U256) -> U256 {
        let bps = U256::from(10_000u32.saturating_sub(self.0));
        expected * bps / U256::from(10_000u32)
    }
}

impl std::fmt::Display for Slippage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

/// Fully resolved request handed to every source
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRequest {
    pub from_chain: u64,
    pub to_chain: u64,
    pub from_token: Address,
    pub to_token: Address,
    pub from_decimals: u8,
    pub to_decimals: u8,
    /// Input amount in base units
    pub amount: U256,
    pub from_address: Address,
    pub to_address: Address,
}

impl QuoteRequest {
    pub fn is_cross_chain(&self) -> bool {
        self.from_chain != self.to_chain
    }
}

/// One source's answer for one request at one slippage bound
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub source_id: String,
    /// Guaranteed output in destination base units
    pub min_output_amount: U256,
    pub slippage: Slippage,
    /// Source-specific payload, opaque to ranking
    pub raw_route: serde_json::Value,
}

/// Everything needed to execute a quote on-chain
#[derive(Debug, Clone, PartialEq)]
pub struct TxPlan {
    pub tx: TxRequest,
    /// Contract that pulls the input token; approval target
    pub spender: Address,
    /// Bridge or exchange tool used, needed for status queries
    pub tool: Option<String>,
    /// Tool names of each step, in execution order
    pub steps: Vec<String>,
}

/// A liquidity source such as an aggregator API
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Stable identifier, also used to look the source up at execution time
    fn id(&self) -> &str;

    /// Whether this source can quote the request at all
    fn supports(&self, request: &QuoteRequest) -> bool {
        !request.is_cross_chain()
    }

    async fn quote(&self, request: &QuoteRequest, slippage: Slippage) -> EngineResult<Quote>;

    /// Turn a quote into a transaction, making a second call when the source needs one
    async fn build_transaction(&self, quote: &Quote, request: &QuoteRequest) -> EngineResult<TxPlan>;
}
