//! Swap and bridge entry points
//!
//! `SwapEngine` validates and resolves a request, hands it to the escalation
//! controller, and for bridges follows the destination leg with the
//! completion tracker while the route stays visible in the registry.

use crate::bridge::{
    CompletionTracker, LifiStatusClient, PollPolicy, RouteExecutionStatus, RouteRegistry,
    StatusClient, StatusQuery, StatusReport, TrackingOutcome,
};
use crate::chain::ChainClient;
use crate::config::Settings;
use crate::error::{EngineError, EngineResult};
use crate::execution::{
    AllowanceGatedExecutor, ApprovalPolicy, EscalationController, EscalationPolicy, Execution,
    QuoteExecutor,
};
use crate::progress::{Progress, ProgressEvent, ProgressSender};
use crate::quotes::sources::{self, LIFI_API};
use crate::quotes::{QuoteAggregator, QuoteRequest};
use crate::tokens::{LifiTokenDirectory, NativeAsset, TokenRef, TokenResolver};

use ethers::types::{Address, H256, U256};
use ethers::utils::{parse_units, ParseUnits};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Same-chain swap of a human-readable amount
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SwapRequest {
    pub chain: u64,
    pub from_token: String,
    pub to_token: String,
    /// Decimal amount, e.g. `"1.5"`
    pub amount: String,
    /// Index of the first slippage tier to try
    #[serde(default)]
    pub slippage_tier: usize,
}

/// Cross-chain transfer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BridgeRequest {
    pub origin_chain: u64,
    pub destination_chain: u64,
    pub currency: String,
    pub to_currency: String,
    /// Amount in base units of `currency`
    pub amount: String,
    /// Defaults to the signing account
    pub recipient: Option<Address>,
    /// Registry id to track the transfer under via `/routes/:id`; generated when absent
    #[serde(default)]
    pub route_id: Option<String>,
}

/// The origin-chain transaction of a swap or bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionResult {
    pub hash: H256,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Settlement {
    Complete { receiving_tx_hash: Option<String> },
    /// Status polling ran out; the transfer may still settle
    Pending { warning: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeResult {
    pub transaction: TransactionResult,
    pub route_id: String,
    pub settlement: Settlement,
}

pub struct SwapEngine {
    resolver: Arc<TokenResolver>,
    aggregator: Arc<QuoteAggregator>,
    executor: Arc<dyn QuoteExecutor>,
    client: Arc<dyn ChainClient>,
    status_client: Arc<dyn StatusClient>,
    tracker: CompletionTracker,
    registry: Arc<RouteRegistry>,
    escalation: EscalationPolicy,
}

impl SwapEngine {
    pub fn new(
        resolver: Arc<TokenResolver>,
        aggregator: Arc<QuoteAggregator>,
        executor: Arc<dyn QuoteExecutor>,
        client: Arc<dyn ChainClient>,
        status_client: Arc<dyn StatusClient>,
    ) -> Self {
        Self {
            resolver,
            aggregator,
            executor,
            client,
            tracker: CompletionTracker::new(status_client.clone(), PollPolicy::default()),
            status_client,
            registry: RouteRegistry::new(),
            escalation: EscalationPolicy::default(),
        }
    }

    /// Wire the engine to the configured sources and LI.FI services
    pub fn from_settings(settings: &Settings, client: Arc<dyn ChainClient>) -> EngineResult<Self> {
        let quote_timeout = Duration::from_millis(settings.engine.quote_timeout_ms);
        let sources = sources::from_settings(&settings.sources, quote_timeout)?;
        let aggregator = Arc::new(QuoteAggregator::new(sources, quote_timeout));

        let lifi = settings.sources.lifi.as_ref();
        let lifi_url = lifi
            .and_then(|c| c.base_url.clone())
            .unwrap_or_else(|| LIFI_API.to_string());
        let lifi_key = lifi.and_then(|c| c.api_key.as_deref());

        let natives: HashMap<u64, NativeAsset> = settings
            .enabled_chains()
            .into_iter()
            .map(|(_, chain)| {
                (
                    chain.chain_id,
                    NativeAsset {
                        symbol: chain.native_symbol.clone(),
                        decimals: chain.native_decimals,
                    },
                )
            })
            .collect();
        let directory = Arc::new(LifiTokenDirectory::new(lifi_url.clone(), lifi_key)?);
        let resolver = Arc::new(TokenResolver::new(directory, client.clone(), natives));

        let executor = Arc::new(AllowanceGatedExecutor::new(
            client.clone(),
            Duration::from_secs(settings.engine.receipt_timeout_secs),
            ApprovalPolicy::from_infinite_flag(settings.engine.infinite_approval),
        ));
        let status_client = Arc::new(LifiStatusClient::new(lifi_url, lifi_key)?);

        info!(
            "Engine ready with sources {:?}",
            aggregator.source_ids()
        );
        Ok(Self::new(resolver, aggregator, executor, client, status_client))
    }

    pub fn with_escalation(mut self, policy: EscalationPolicy) -> Self {
        self.escalation = policy;
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.tracker = CompletionTracker::new(self.status_client.clone(), policy);
        self
    }

    pub fn with_registry(mut self, registry: Arc<RouteRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.aggregator.source_ids()
    }

    /// Swap on one chain, escalating slippage as needed
    pub async fn swap(&self, request: SwapRequest) -> EngineResult<TransactionResult> {
        if request.slippage_tier >= self.escalation.tiers.len() {
            return Err(EngineError::InvalidRequest(format!(
                "slippage tier {} out of range (0..{})",
                request.slippage_tier,
                self.escalation.tiers.len()
            )));
        }
        self.ensure_chain(request.chain)?;

        let from_token = self.resolve_token(&request.from_token, request.chain).await?;
        let to_token = self.resolve_token(&request.to_token, request.chain).await?;
        if from_token == to_token {
            return Err(EngineError::InvalidRequest(
                "cannot swap a token for itself".to_string(),
            ));
        }

        let from_decimals = self.decimals(from_token, request.chain).await;
        let to_decimals = self.decimals(to_token, request.chain).await;
        let amount = parse_amount(&request.amount, from_decimals)?;

        let owner = self.client.address();
        let quote_request = QuoteRequest {
            from_chain: request.chain,
            to_chain: request.chain,
            from_token,
            to_token,
            from_decimals,
            to_decimals,
            amount,
            from_address: owner,
            to_address: owner,
        };

        info!(
            "Swap {} {} -> {} on chain {}",
            request.amount, request.from_token, request.to_token, request.chain
        );
        let policy = EscalationPolicy {
            tiers: self.escalation.tiers[request.slippage_tier..].to_vec(),
            tier_backoff: self.escalation.tier_backoff,
        };
        let execution = self
            .controller(policy)
            .run(&quote_request, &Progress::none())
            .await?;

        Ok(self.transaction_result(request.chain, &execution))
    }

    /// Bridge across chains and follow the destination leg.
    ///
    /// A destination `FAILED` is an error flagged `origin_submitted`; running
    /// out of status polls is reported as `Settlement::Pending`.
    pub async fn bridge(
        &self,
        request: BridgeRequest,
        progress: Option<ProgressSender>,
    ) -> EngineResult<BridgeResult> {
        if request.origin_chain == request.destination_chain {
            return Err(EngineError::InvalidRequest(
                "origin and destination chain must differ".to_string(),
            ));
        }
        self.ensure_chain(request.origin_chain)?;
        self.ensure_chain(request.destination_chain)?;

        let amount = U256::from_dec_str(request.amount.trim()).map_err(|_| {
            EngineError::InvalidRequest(format!("invalid base-unit amount {:?}", request.amount))
        })?;
        if amount.is_zero() {
            return Err(EngineError::InvalidRequest("amount must be positive".to_string()));
        }

        let progress = Progress::new(progress);
        let route = match request.route_id.clone() {
            Some(id) if id.trim().is_empty() => {
                return Err(EngineError::InvalidRequest("route id must not be empty".to_string()))
            }
            Some(id) => self.registry.begin_with_id(id)?,
            None => self.registry.begin(),
        };
        let route_id = route.id().to_string();
        progress.emit(ProgressEvent::RouteStarted {
            route_id: route_id.clone(),
        });

        let from_token = self
            .resolve_token(&request.currency, request.origin_chain)
            .await?;
        let to_token = self
            .resolve_token(&request.to_currency, request.destination_chain)
            .await?;
        let owner = self.client.address();
        let quote_request = QuoteRequest {
            from_chain: request.origin_chain,
            to_chain: request.destination_chain,
            from_token,
            to_token,
            from_decimals: self.decimals(from_token, request.origin_chain).await,
            to_decimals: self.decimals(to_token, request.destination_chain).await,
            amount,
            from_address: owner,
            to_address: request.recipient.unwrap_or(owner),
        };

        info!(
            "Route {}: bridge {} {} from chain {} to {} {} on chain {}",
            route_id,
            amount,
            request.currency,
            request.origin_chain,
            request.to_currency,
            quote_request.to_address,
            request.destination_chain
        );

        let execution = match self
            .controller(self.escalation.clone())
            .run(&quote_request, &progress)
            .await
        {
            Ok(execution) => execution,
            Err(e) => {
                route.update(|s| s.fail(e.to_string()));
                progress.emit(ProgressEvent::Failed {
                    route_id,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let tx_hash = format!("{:?}", execution.transaction_hash);
        route.update(|s| {
            s.set_steps(&execution.plan.steps);
            s.record_origin(tx_hash.clone());
        });
        progress.emit(ProgressEvent::OriginConfirmed {
            route_id: route_id.clone(),
            tx_hash: execution.transaction_hash,
        });

        let query = StatusQuery {
            tx_hash: tx_hash.clone(),
            from_chain: request.origin_chain,
            to_chain: request.destination_chain,
            tool: execution.plan.tool.clone(),
        };
        let transaction = self.transaction_result(request.origin_chain, &execution);

        match self.tracker.track(&query, &route, &progress).await {
            TrackingOutcome::Complete {
                receiving_tx_hash, ..
            } => Ok(BridgeResult {
                transaction,
                route_id,
                settlement: Settlement::Complete { receiving_tx_hash },
            }),
            TrackingOutcome::Failed { reason, .. } => {
                Err(EngineError::BridgeFailed { tx_hash, reason })
            }
            TrackingOutcome::TimedOut { polls } => {
                let warning = format!(
                    "origin transaction {} confirmed; destination not settled after {} status checks and may still arrive",
                    tx_hash, polls
                );
                warn!("Route {}: {}", route_id, warning);
                Ok(BridgeResult {
                    transaction,
                    route_id,
                    settlement: Settlement::Pending { warning },
                })
            }
        }
    }

    /// Stateless status check, independent of any in-flight route
    pub async fn get_status(&self, query: &StatusQuery) -> EngineResult<StatusReport> {
        Ok(self.status_client.status(query).await?.report())
    }

    pub fn route_status(&self, route_id: &str) -> Option<RouteExecutionStatus> {
        self.registry.get(route_id)
    }

    pub fn active_routes(&self) -> Vec<RouteExecutionStatus> {
        self.registry.active()
    }

    fn controller(&self, policy: EscalationPolicy) -> EscalationController {
        EscalationController::new(self.aggregator.clone(), self.executor.clone(), policy)
    }

    fn ensure_chain(&self, chain_id: u64) -> EngineResult<()> {
        match self.resolver.native(chain_id) {
            Some(_) => Ok(()),
            None => Err(EngineError::InvalidRequest(format!(
                "chain {} is not configured",
                chain_id
            ))),
        }
    }

    async fn resolve_token(&self, input: &str, chain_id: u64) -> EngineResult<Address> {
        let resolved = self.resolver.resolve(input, chain_id).await;
        match resolved.value {
            TokenRef::Address(address) => Ok(address),
            TokenRef::Unresolved(raw) => Err(EngineError::InvalidRequest(format!(
                "invalid token {} on chain {}: {}",
                raw,
                chain_id,
                resolved.degraded.unwrap_or_default()
            ))),
        }
    }

    async fn decimals(&self, token: Address, chain_id: u64) -> u8 {
        let resolved = self.resolver.decimals(token, chain_id).await;
        if let Some(reason) = &resolved.degraded {
            warn!(
                "Assuming {} decimals for {:?} on chain {}: {}",
                resolved.value, token, chain_id, reason
            );
        }
        resolved.value
    }

    fn transaction_result(&self, chain_id: u64, execution: &Execution) -> TransactionResult {
        TransactionResult {
            hash: execution.transaction_hash,
            from: self.client.address(),
            to: execution.plan.tx.to,
            value: execution.plan.tx.value,
            chain_id,
        }
    }
}

/// Decimal string to base units
fn parse_amount(amount: &str, decimals: u8) -> EngineResult<U256> {
    let invalid = || EngineError::InvalidRequest(format!("invalid amount {:?}", amount));

    let amount = amount.trim();
    if let Some((_, fraction)) = amount.split_once('.') {
        if fraction.len() > decimals as usize {
            return Err(EngineError::InvalidRequest(format!(
                "amount {:?} has more than {} decimal places",
                amount, decimals
            )));
        }
    }

    let value = match parse_units(amount, decimals as u32).map_err(|_| invalid())? {
        ParseUnits::U256(value) => value,
        ParseUnits::I256(_) => return Err(invalid()),
    };
    if value.is_zero() {
        return Err(EngineError::InvalidRequest("amount must be positive".to_string()));
    }
    Ok(value)
}
