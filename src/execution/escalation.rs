//! Slippage escalation: fresh quotes per tier, tried best-first

use super::QuoteExecutor;
use crate::error::{EngineError, EngineResult};
use crate::progress::Progress;
use crate::quotes::{Quote, QuoteAggregator, QuoteRequest, Slippage, TxPlan};

use ethers::types::H256;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Requested slippage bounds, tightest first
pub const SLIPPAGE_TIERS: [Slippage; 3] = [
    Slippage::from_bps(100),
    Slippage::from_bps(150),
    Slippage::from_bps(200),
];

/// Pause before re-quoting at the next tier
pub const TIER_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    pub tiers: Vec<Slippage>,
    pub tier_backoff: Duration,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            tiers: SLIPPAGE_TIERS.to_vec(),
            tier_backoff: TIER_BACKOFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Quoting { tier: usize },
    Trying { tier: usize, quote_index: usize },
    Succeeded,
    Exhausted,
}

/// A confirmed transaction and the quote that produced it
#[derive(Debug, Clone)]
pub struct Execution {
    pub transaction_hash: H256,
    pub plan: TxPlan,
    pub quote: Quote,
    /// Execution attempts across all tiers, including the successful one
    pub attempts: u32,
}

pub struct EscalationController {
    aggregator: Arc<QuoteAggregator>,
    executor: Arc<dyn QuoteExecutor>,
    policy: EscalationPolicy,
}

impl EscalationController {
    pub fn new(
        aggregator: Arc<QuoteAggregator>,
        executor: Arc<dyn QuoteExecutor>,
        policy: EscalationPolicy,
    ) -> Self {
        Self {
            aggregator,
            executor,
            policy,
        }
    }

    fn enter(state: &mut ControllerState, next: ControllerState) {
        debug!("Escalation {:?} -> {:?}", state, next);
        *state = next;
    }

    /// Drive the request until one quote succeeds or every tier is spent.
    ///
    /// Retryable failures move to the next quote at the same tier; an empty
    /// quote set moves to the next tier; anything else aborts at once. At most
    /// `tiers x sources` executions are attempted.
    pub async fn run(&self, request: &QuoteRequest, progress: &Progress) -> EngineResult<Execution> {
        let mut state = ControllerState::Idle;
        let mut attempts = 0u32;
        let mut last_error: Option<EngineError> = None;

        for (tier, slippage) in self.policy.tiers.iter().copied().enumerate() {
            if tier > 0 {
                info!("Escalating to slippage tier {} ({})", tier + 1, slippage);
                crate::metrics::record_tier_escalation(slippage.bps());
                sleep(self.policy.tier_backoff).await;
            }
            Self::enter(&mut state, ControllerState::Quoting { tier });

            let quotes = match self.aggregator.get_quotes(request, slippage).await {
                Ok(quotes) => quotes,
                Err(e) => {
                    warn!("No quotes at {}: {}", slippage, e);
                    last_error = Some(e);
                    continue;
                }
            };

            for (quote_index, quote) in quotes.into_iter().enumerate() {
                Self::enter(&mut state, ControllerState::Trying { tier, quote_index });

                let source = self
                    .aggregator
                    .source(&quote.source_id)
                    .ok_or_else(|| EngineError::UnknownSource(quote.source_id.clone()))?;

                attempts += 1;
                let outcome = self
                    .executor
                    .execute(&quote, source.as_ref(), request, progress)
                    .await;

                if outcome.success {
                    if let (Some(transaction_hash), Some(plan)) =
                        (outcome.transaction_hash, outcome.plan)
                    {
                        Self::enter(&mut state, ControllerState::Succeeded);
                        info!(
                            "Executed via {} at {} on attempt {}: {:?}",
                            quote.source_id, slippage, attempts, transaction_hash
                        );
                        return Ok(Execution {
                            transaction_hash,
                            plan,
                            quote,
                            attempts,
                        });
                    }
                    return Err(EngineError::Internal(
                        "successful execution without a transaction".to_string(),
                    ));
                }

                let failure = outcome.error.unwrap_or_else(|| {
                    EngineError::Internal("execution failed without an error".to_string())
                });
                let class = outcome.error_class.unwrap_or_else(|| failure.class());

                if !class.is_retryable() {
                    error!(
                        "Attempt {} via {} failed with non-retryable {}: {}",
                        attempts,
                        quote.source_id,
                        class.as_str(),
                        failure
                    );
                    return Err(failure);
                }

                warn!(
                    "Attempt {} via {} at {} failed ({}): {}",
                    attempts,
                    quote.source_id,
                    slippage,
                    class.as_str(),
                    failure
                );
                last_error = Some(failure);
            }
        }

        Self::enter(&mut state, ControllerState::Exhausted);
        let last = last_error.unwrap_or_else(|| {
            EngineError::NoRouteFound {
                slippage_bps: self.policy.tiers.last().map(|s| s.bps()).unwrap_or_default(),
            }
        });
        error!("All slippage tiers exhausted after {} attempts: {}", attempts, last);

        Err(EngineError::Exhausted {
            attempts,
            last: Box::new(last),
        })
    }
}
