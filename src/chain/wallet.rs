//! Local-key wallet implementing the signing capability over ethers

use super::{ChainClient, ChainManager, GasPrice, TxReceipt, TxRequest};
use crate::error::{EngineError, EngineResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// Broadcast timeout for a single raw transaction
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between receipt lookups
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Node rejections that guarantee the transaction was not accepted
const REJECTED_BEFORE_POOL: &[&str] = &[
    "underpriced",
    "intrinsic gas too low",
    "exceeds block gas limit",
    "fee cap less than block base fee",
    "max fee per gas less than block base fee",
    "invalid sender",
    "connection refused",
];

/// Map a failed `eth_sendRawTransaction` onto an engine error.
///
/// Unless the node clearly rejected the transaction, it may already be in a
/// mempool and is reported as `SubmissionUnknown` under its local hash.
pub(crate) fn broadcast_error(chain_id: u64, tx_hash: H256, message: String) -> EngineError {
    let lower = message.to_lowercase();
    if lower.contains("insufficient funds") {
        return EngineError::InvalidRequest(format!("Insufficient funds on chain {}", chain_id));
    }
    if REJECTED_BEFORE_POOL.iter().any(|p| lower.contains(p)) {
        return EngineError::NetworkOrTimeout(message);
    }

    warn!(
        "Broadcast of {:?} on chain {} ambiguous: {}",
        tx_hash, chain_id, message
    );
    EngineError::SubmissionUnknown {
        chain_id,
        tx_hash: format!("{:?}", tx_hash),
        reason: message,
    }
}

/// Signs with a single local key across every configured chain
pub struct EvmWallet {
    chain_manager: Arc<ChainManager>,
    wallet: LocalWallet,
}

impl EvmWallet {
    pub fn new(chain_manager: Arc<ChainManager>, wallet: LocalWallet) -> Self {
        info!("Wallet initialized: {:?}", wallet.address());
        Self {
            chain_manager,
            wallet,
        }
    }

    /// Load wallet from the environment variable named in config
    pub fn from_env(chain_manager: Arc<ChainManager>, var_name: &str) -> EngineResult<Self> {
        let key = std::env::var(var_name).map_err(|_| {
            EngineError::Wallet(format!("No wallet configured. Set {}", var_name))
        })?;

        let wallet = key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| EngineError::Wallet(format!("Invalid private key: {}", e)))?;

        Ok(Self::new(chain_manager, wallet))
    }

    /// Build a typed transaction for the given gas pricing
    fn build_tx(&self, chain_id: u64, tx: &TxRequest, nonce: Option<U256>) -> TypedTransaction {
        let mut typed: TypedTransaction = match tx.gas_price {
            Some(GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            }) => Eip1559TransactionRequest::new()
                .max_fee_per_gas(max_fee_per_gas)
                .max_priority_fee_per_gas(max_priority_fee_per_gas)
                .into(),
            Some(GasPrice::Legacy(price)) => TransactionRequest::new().gas_price(price).into(),
            None => TransactionRequest::new().into(),
        };

        typed.set_from(self.wallet.address());
        typed.set_to(tx.to);
        typed.set_data(tx.data.clone());
        typed.set_value(tx.value);
        typed.set_chain_id(chain_id);
        if let Some(gas) = tx.gas_limit {
            typed.set_gas(gas);
        }
        if let Some(nonce) = nonce {
            typed.set_nonce(nonce);
        }
        typed
    }
}

#[async_trait]
impl ChainClient for EvmWallet {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn call(&self, chain_id: u64, to: Address, data: Bytes) -> EngineResult<Bytes> {
        let provider = self.chain_manager.get_provider(chain_id)?;
        let tx = self.build_tx(chain_id, &TxRequest::new(to, data, U256::zero()), None);
        provider.call(&tx).await
    }

    async fn estimate_gas(&self, chain_id: u64, tx: &TxRequest) -> EngineResult<U256> {
        let provider = self.chain_manager.get_provider(chain_id)?;
        let typed = self.build_tx(chain_id, tx, None);
        provider.estimate_gas(&typed).await
    }

    async fn gas_price(&self, chain_id: u64) -> EngineResult<GasPrice> {
        self.chain_manager.get_provider(chain_id)?.get_gas_price().await
    }

    async fn send_transaction(&self, chain_id: u64, tx: TxRequest) -> EngineResult<H256> {
        let provider = self.chain_manager.get_provider(chain_id)?;
        let nonce = provider.pending_nonce(self.wallet.address()).await?;
        let typed = self.build_tx(chain_id, &tx, Some(nonce));

        let wallet = self.wallet.clone().with_chain_id(chain_id);
        let signature = wallet
            .sign_transaction(&typed)
            .await
            .map_err(|e| EngineError::Wallet(e.to_string()))?;
        let raw = typed.rlp_signed(&signature);
        let tx_hash = typed.hash(&signature);

        let sent = timeout(SEND_TIMEOUT, provider.http().send_raw_transaction(raw)).await;
        match sent {
            Ok(Ok(pending)) => {
                debug!(
                    "Transaction sent on chain {}: {:?} (nonce {})",
                    chain_id,
                    pending.tx_hash(),
                    nonce
                );
                Ok(tx_hash)
            }
            Ok(Err(e)) => Err(broadcast_error(chain_id, tx_hash, e.to_string())),
            Err(_) => {
                warn!("Transaction send timeout on chain {}: {:?}", chain_id, tx_hash);
                Err(EngineError::SubmissionUnknown {
                    chain_id,
                    tx_hash: format!("{:?}", tx_hash),
                    reason: format!("send timed out after {:?}", SEND_TIMEOUT),
                })
            }
        }
    }

    async fn wait_for_receipt(
        &self,
        chain_id: u64,
        tx_hash: H256,
        timeout: Duration,
    ) -> EngineResult<TxReceipt> {
        let provider = self.chain_manager.get_provider(chain_id)?;
        let deadline = Instant::now() + timeout;

        loop {
            match provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) if receipt.block_number.is_some() => {
                    return Ok(TxReceipt {
                        tx_hash,
                        success: receipt.status == Some(1u64.into()),
                        block_number: receipt.block_number.map(|b| b.as_u64()),
                        gas_used: receipt.gas_used,
                    });
                }
                Ok(_) => {}
                Err(e) => debug!("Receipt lookup failed for {:?}: {}", tx_hash, e),
            }

            if Instant::now() + RECEIPT_POLL_INTERVAL > deadline {
                return Err(EngineError::ReceiptTimeout {
                    chain_id,
                    tx_hash: format!("{:?}", tx_hash),
                });
            }
            sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    fn hash() -> H256 {
        H256::repeat_byte(0x42)
    }

    #[test]
    fn test_known_or_stale_nonce_is_in_flight() {
        for message in [
            "already known",
            "nonce too low",
            "error sending request for url (http://node:8545/)",
        ] {
            let err = broadcast_error(1, hash(), message.to_string());
            assert_eq!(err.class(), ErrorClass::InFlightUnknown, "{}", message);
            assert!(err.origin_submitted());
            assert!(err.to_string().contains(&format!("{:?}", hash())));
        }
    }

    #[test]
    fn test_clear_rejections_stay_retryable() {
        let err = broadcast_error(1, hash(), "transaction underpriced".to_string());
        assert_eq!(err.class(), ErrorClass::NetworkOrTimeout);
        assert!(!err.origin_submitted());

        let err = broadcast_error(
            1,
            hash(),
            "insufficient funds for gas * price + value".to_string(),
        );
        assert_eq!(err.class(), ErrorClass::InvalidRequest);
    }

    #[test]
    fn test_local_hash_matches_signed_payload() {
        let wallet: LocalWallet =
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
                .parse()
                .unwrap();
        let typed: TypedTransaction = TransactionRequest::new()
            .to(Address::repeat_byte(0x22))
            .value(1u64)
            .gas(21_000u64)
            .gas_price(1_000_000_000u64)
            .nonce(0u64)
            .chain_id(1u64)
            .into();
        let signature = wallet.with_chain_id(1u64).sign_transaction_sync(&typed).unwrap();

        let expected = H256::from(ethers::utils::keccak256(typed.rlp_signed(&signature)));
        assert_eq!(typed.hash(&signature), expected);
    }
}
