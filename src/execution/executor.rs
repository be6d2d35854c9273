//! Allowance-gated execution of a single quote

use super::{ExecutionOutcome, QuoteExecutor};
use crate::chain::{ChainClient, TxRequest};
use crate::error::{EngineError, EngineResult};
use crate::progress::{Progress, ProgressEvent};
use crate::quotes::{Quote, QuoteRequest, QuoteSource, TxPlan};
use crate::tokens::is_native;
use crate::tx::{erc20, GasEstimator};

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How much to approve when the current allowance is short
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApprovalPolicy {
    /// Exactly the input amount
    #[default]
    Exact,
    /// `U256::MAX`, opt-in only
    Infinite,
}

impl ApprovalPolicy {
    pub fn from_infinite_flag(infinite: bool) -> Self {
        if infinite {
            ApprovalPolicy::Infinite
        } else {
            ApprovalPolicy::Exact
        }
    }
}

/// Allowance snapshot, read fresh before every attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowanceState {
    pub owner: Address,
    pub spender: Address,
    pub token: Address,
    pub current_allowance: U256,
    pub required_amount: U256,
}

impl AllowanceState {
    pub fn needs_approval(&self) -> bool {
        self.current_allowance < self.required_amount
    }
}

/// Submits approval (when short) then the trade or bridge transaction
pub struct AllowanceGatedExecutor {
    client: Arc<dyn ChainClient>,
    gas: GasEstimator,
    receipt_timeout: Duration,
    approval_policy: ApprovalPolicy,
}

impl AllowanceGatedExecutor {
    pub fn new(
        client: Arc<dyn ChainClient>,
        receipt_timeout: Duration,
        approval_policy: ApprovalPolicy,
    ) -> Self {
        Self {
            client,
            gas: GasEstimator::new(),
            receipt_timeout,
            approval_policy,
        }
    }

    /// Read `allowance(owner, spender)` for the input token
    pub async fn read_allowance(
        &self,
        request: &QuoteRequest,
        spender: Address,
    ) -> EngineResult<AllowanceState> {
        let owner = self.client.address();
        let output = self
            .client
            .call(
                request.from_chain,
                request.from_token,
                erc20::encode_allowance(owner, spender),
            )
            .await?;

        Ok(AllowanceState {
            owner,
            spender,
            token: request.from_token,
            current_allowance: erc20::decode_uint(&output)?,
            required_amount: request.amount,
        })
    }

    /// Submit an approval and block until it is mined
    async fn approve(
        &self,
        chain_id: u64,
        state: &AllowanceState,
        progress: &Progress,
    ) -> EngineResult<H256> {
        let amount = match self.approval_policy {
            ApprovalPolicy::Exact => state.required_amount,
            ApprovalPolicy::Infinite => U256::MAX,
        };
        let approval_failed = |e: EngineError| EngineError::ApprovalFailed(e.to_string());

        let tx = TxRequest::new(
            state.token,
            erc20::encode_approve(state.spender, amount),
            U256::zero(),
        );
        let tx = self
            .gas
            .prepare(self.client.as_ref(), chain_id, tx)
            .await
            .map_err(approval_failed)?;
        let tx_hash = self
            .client
            .send_transaction(chain_id, tx)
            .await
            .map_err(approval_failed)?;

        info!(
            "Approval {:?} submitted on chain {}: {:?} may spend {}",
            tx_hash, chain_id, state.spender, amount
        );
        crate::metrics::record_approval_submitted(chain_id);
        progress.emit(ProgressEvent::ApprovalSubmitted {
            chain_id,
            tx_hash,
            spender: state.spender,
            amount,
        });

        let receipt = self
            .client
            .wait_for_receipt(chain_id, tx_hash, self.receipt_timeout)
            .await
            .map_err(approval_failed)?;
        if !receipt.success {
            return Err(EngineError::ApprovalFailed(format!(
                "approval {:?} reverted",
                tx_hash
            )));
        }
        Ok(tx_hash)
    }

    async fn execute_plan(
        &self,
        quote: &Quote,
        source: &dyn QuoteSource,
        request: &QuoteRequest,
        progress: &Progress,
    ) -> EngineResult<(H256, TxPlan)> {
        let chain_id = request.from_chain;
        let plan = source
            .build_transaction(quote, request)
            .await
            .map_err(|e| route_unusable(&quote.source_id, e))?;

        if is_native(&request.from_token) {
            debug!("Native input on chain {}, no allowance needed", chain_id);
        } else {
            let state = self.read_allowance(request, plan.spender).await?;
            if state.needs_approval() {
                debug!(
                    "Allowance {} below required {} for {:?}",
                    state.current_allowance, state.required_amount, state.spender
                );
                self.approve(chain_id, &state, progress).await?;
            }
        }

        let tx = self
            .gas
            .prepare(self.client.as_ref(), chain_id, plan.tx.clone())
            .await?;
        if let (Some(limit), Some(price)) = (tx.gas_limit, tx.gas_price.as_ref()) {
            debug!(
                "Max gas cost on chain {}: {} wei",
                chain_id,
                GasEstimator::calculate_cost(limit, price)
            );
        }

        let started = Instant::now();
        let tx_hash = self.client.send_transaction(chain_id, tx).await?;
        info!(
            "Submitted {} transaction {:?} on chain {}",
            quote.source_id, tx_hash, chain_id
        );
        progress.emit(ProgressEvent::TransactionSubmitted { chain_id, tx_hash });

        // Past this point the transaction may land; never report a retryable error
        let receipt = self
            .client
            .wait_for_receipt(chain_id, tx_hash, self.receipt_timeout)
            .await
            .map_err(|e| match e {
                EngineError::ReceiptTimeout { .. } => e,
                other => {
                    warn!("Receipt wait for {:?} failed: {}", tx_hash, other);
                    EngineError::ReceiptTimeout {
                        chain_id,
                        tx_hash: format!("{:?}", tx_hash),
                    }
                }
            })?;
        crate::metrics::record_tx_latency(chain_id, started.elapsed().as_secs_f64());

        if !receipt.success {
            return Err(EngineError::OnChainRevert {
                chain_id,
                tx_hash: format!("{:?}", tx_hash),
            });
        }

        Ok((tx_hash, plan))
    }
}

/// A source failing to build its own route only rules out that quote
fn route_unusable(source_id: &str, error: EngineError) -> EngineError {
    if error.class().is_retryable() {
        return error;
    }
    EngineError::RouteUnusable {
        source_id: source_id.to_string(),
        message: error.to_string(),
    }
}

#[async_trait]
impl QuoteExecutor for AllowanceGatedExecutor {
    async fn execute(
        &self,
        quote: &Quote,
        source: &dyn QuoteSource,
        request: &QuoteRequest,
        progress: &Progress,
    ) -> ExecutionOutcome {
        crate::metrics::record_execution_attempt(request.from_chain, &quote.source_id);

        match self.execute_plan(quote, source, request, progress).await {
            Ok((tx_hash, plan)) => {
                crate::metrics::record_execution_outcome(request.from_chain, "success");
                ExecutionOutcome::succeeded(tx_hash, plan)
            }
            Err(e) => {
                crate::metrics::record_execution_outcome(request.from_chain, e.class().as_str());
                ExecutionOutcome::failed(e)
            }
        }
    }
}
