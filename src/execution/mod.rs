//! Execution of ranked quotes
//!
//! The escalation controller walks slippage tiers and ranked quotes; the
//! allowance-gated executor turns one quote into one confirmed transaction.

mod escalation;
mod executor;

pub use escalation::{
    ControllerState, EscalationController, EscalationPolicy, Execution, SLIPPAGE_TIERS,
    TIER_BACKOFF,
};
pub use executor::{AllowanceGatedExecutor, AllowanceState, ApprovalPolicy};

use crate::error::{EngineError, ErrorClass};
use crate::progress::Progress;
use crate::quotes::{Quote, QuoteRequest, QuoteSource, TxPlan};

use async_trait::async_trait;
use ethers::types::H256;

/// Result of one execution attempt against one quote
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub transaction_hash: Option<H256>,
    pub error: Option<EngineError>,
    pub error_class: Option<ErrorClass>,
    /// Transaction that was submitted, when it got that far
    pub plan: Option<TxPlan>,
}

impl ExecutionOutcome {
    pub fn succeeded(transaction_hash: H256, plan: TxPlan) -> Self {
        Self {
            success: true,
            transaction_hash: Some(transaction_hash),
            error: None,
            error_class: None,
            plan: Some(plan),
        }
    }

    pub fn failed(error: EngineError) -> Self {
        Self {
            success: false,
            transaction_hash: None,
            error_class: Some(error.class()),
            error: Some(error),
            plan: None,
        }
    }
}

/// Executes a single quote end to end
#[async_trait]
pub trait QuoteExecutor: Send + Sync {
    async fn execute(
        &self,
        quote: &Quote,
        source: &dyn QuoteSource,
        request: &QuoteRequest,
        progress: &Progress,
    ) -> ExecutionOutcome;
}
