//! Chain module - per-chain RPC access and the signing capability
//!
//! This module provides:
//! - Multi-RPC provider management with automatic failover
//! - The `ChainClient` seam used by the executor and token resolver
//! - A local-key wallet implementing that seam over ethers

pub mod provider;
pub mod wallet;

pub use provider::{ChainProvider, GasPrice};
pub use wallet::EvmWallet;

use crate::config::Settings;
use crate::error::{EngineError, EngineResult};

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::types::{Address, Bytes, H256, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Unsigned transaction handed to the signing capability
#[derive(Debug, Clone, PartialEq)]
pub struct TxRequest {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: Option<U256>,
    pub gas_price: Option<GasPrice>,
}

impl TxRequest {
    pub fn new(to: Address, data: Bytes, value: U256) -> Self {
        Self {
            to,
            data,
            value,
            gas_limit: None,
            gas_price: None,
        }
    }
}

/// Mined transaction outcome
#[derive(Debug, Clone, PartialEq)]
pub struct TxReceipt {
    pub tx_hash: H256,
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
}

/// Read and write access to EVM chains on behalf of one account
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Account that signs and owns the funds
    fn address(&self) -> Address;

    /// Read-only contract call
    async fn call(&self, chain_id: u64, to: Address, data: Bytes) -> EngineResult<Bytes>;

    async fn estimate_gas(&self, chain_id: u64, tx: &TxRequest) -> EngineResult<U256>;

    async fn gas_price(&self, chain_id: u64) -> EngineResult<GasPrice>;

    /// Sign and broadcast, returning the transaction hash
    async fn send_transaction(&self, chain_id: u64, tx: TxRequest) -> EngineResult<H256>;

    /// Wait for the receipt; `ReceiptTimeout` once `timeout` elapses
    async fn wait_for_receipt(
        &self,
        chain_id: u64,
        tx_hash: H256,
        timeout: Duration,
    ) -> EngineResult<TxReceipt>;
}

/// Manages connections to all configured chains
pub struct ChainManager {
    /// Chain providers indexed by chain ID
    providers: DashMap<u64, Arc<ChainProvider>>,
}

impl ChainManager {
    /// Create a new chain manager with all configured chains
    pub fn new(settings: &Settings) -> EngineResult<Self> {
        let providers = DashMap::new();

        for (name, chain_config) in settings.enabled_chains() {
            info!(
                "Initializing chain {} (ID: {})",
                chain_config.name, chain_config.chain_id
            );

            match ChainProvider::new(chain_config.clone()) {
                Ok(provider) => {
                    providers.insert(chain_config.chain_id, Arc::new(provider));
                }
                Err(e) => warn!("Skipping chain {}: {}", name, e),
            }
        }

        if providers.is_empty() {
            return Err(EngineError::Config("No chain could be initialized".to_string()));
        }

        Ok(Self { providers })
    }

    /// Get provider for a specific chain
    pub fn get_provider(&self, chain_id: u64) -> EngineResult<Arc<ChainProvider>> {
        self.providers
            .get(&chain_id)
            .map(|p| p.clone())
            .ok_or(EngineError::ChainNotFound { chain_id })
    }

    /// Health check for all chains
    pub async fn health_check(&self) -> Vec<(u64, bool)> {
        let providers: Vec<_> = self.providers.iter().map(|e| e.value().clone()).collect();
        let mut results = Vec::new();

        for provider in providers {
            let healthy = provider.health_check().await;
            results.push((provider.chain_id(), healthy));
        }

        results
    }

    /// Get all connected chain IDs
    pub fn connected_chains(&self) -> Vec<u64> {
        self.providers.iter().map(|e| *e.key()).collect()
    }
}
