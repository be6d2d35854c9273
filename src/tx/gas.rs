//! Gas safety buffers applied before every submission

use crate::chain::{ChainClient, GasPrice, TxRequest};
use crate::error::EngineResult;

use ethers::types::U256;
use tracing::debug;

/// Buffer on the estimated gas limit, in percent
pub const GAS_LIMIT_BUFFER_PERCENT: u64 = 20;

/// Buffer on the quoted gas price, in percent
pub const GAS_PRICE_BUFFER_PERCENT: u64 = 10;

/// Gas estimator for transactions
#[derive(Debug, Clone)]
pub struct GasEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
    /// Buffer percentage for gas price
    gas_price_buffer_percent: u64,
}

impl GasEstimator {
    /// Create a new gas estimator
    pub fn new() -> Self {
        Self {
            gas_limit_buffer_percent: GAS_LIMIT_BUFFER_PERCENT,
            gas_price_buffer_percent: GAS_PRICE_BUFFER_PERCENT,
        }
    }

    /// Gas limit with buffer applied
    pub fn buffered_limit(&self, estimate: U256) -> U256 {
        estimate + estimate * self.gas_limit_buffer_percent / 100
    }

    /// Gas price with buffer applied
    pub fn buffered_price(&self, gas_price: GasPrice) -> GasPrice {
        match gas_price {
            GasPrice::Legacy(price) => {
                GasPrice::Legacy(price + price * self.gas_price_buffer_percent / 100)
            }
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => GasPrice::Eip1559 {
                max_fee_per_gas: max_fee_per_gas
                    + max_fee_per_gas * self.gas_price_buffer_percent / 100,
                max_priority_fee_per_gas: max_priority_fee_per_gas
                    + max_priority_fee_per_gas * self.gas_price_buffer_percent / 100,
            },
        }
    }

    /// Fill gas limit and price on a transaction.
    ///
    /// A limit suggested by the route is preferred over a fresh estimate; both
    /// receive the same buffer.
    pub async fn prepare(
        &self,
        client: &dyn ChainClient,
        chain_id: u64,
        mut tx: TxRequest,
    ) -> EngineResult<TxRequest> {
        let base_limit = match tx.gas_limit {
            Some(limit) if !limit.is_zero() => limit,
            _ => client.estimate_gas(chain_id, &tx).await?,
        };
        let price = client.gas_price(chain_id).await?;

        tx.gas_limit = Some(self.buffered_limit(base_limit));
        tx.gas_price = Some(self.buffered_price(price));

        debug!(
            "Gas for chain {}: limit {} -> {:?}, price {:?}",
            chain_id, base_limit, tx.gas_limit, tx.gas_price
        );
        Ok(tx)
    }

    /// Calculate total cost in wei
    pub fn calculate_cost(gas_limit: U256, gas_price: &GasPrice) -> U256 {
        match gas_price {
            GasPrice::Legacy(price) => gas_limit * *price,
            GasPrice::Eip1559 { max_fee_per_gas, .. } => gas_limit * *max_fee_per_gas,
        }
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new()
    }
}
