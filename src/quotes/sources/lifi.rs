//! LI.FI aggregator: same-chain swaps and cross-chain bridges in one call

use super::parse_amount;
use crate::chain::TxRequest;
use crate::error::{EngineError, EngineResult};
use crate::http;
use crate::quotes::{Quote, QuoteRequest, QuoteSource, Slippage, TxPlan};

use async_trait::async_trait;
use ethers::types::{Address, Bytes};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const LIFI_API: &str = "https://li.quest";

const SOURCE_ID: &str = "lifi";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiQuote {
    tool: String,
    estimate: LifiEstimate,
    #[serde(default)]
    included_steps: Vec<LifiStep>,
    transaction_request: Option<LifiTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiEstimate {
    to_amount_min: String,
    approval_address: Option<Address>,
}

#[derive(Debug, Deserialize)]
struct LifiStep {
    tool: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiTransaction {
    to: Address,
    data: Bytes,
    value: Option<String>,
    gas_limit: Option<String>,
}

/// LI.FI `/v1/quote` client
pub struct LifiSource {
    client: Client,
    base_url: String,
    integrator: Option<String>,
}

impl LifiSource {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<&str>,
        integrator: Option<String>,
        timeout: Duration,
    ) -> EngineResult<Self> {
        let headers: Vec<(&str, &str)> = api_key
            .map(|k| vec![("x-lifi-api-key", k)])
            .unwrap_or_default();
        Ok(Self {
            client: http::build_client(SOURCE_ID, timeout, &headers)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            integrator,
        })
    }

    fn parse(raw: &serde_json::Value) -> EngineResult<LifiQuote> {
        serde_json::from_value(raw.clone())
            .map_err(|e| EngineError::Internal(format!("malformed LI.FI route: {}", e)))
    }
}

#[async_trait]
impl QuoteSource for LifiSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    fn supports(&self, _request: &QuoteRequest) -> bool {
        true
    }

    async fn quote(&self, request: &QuoteRequest, slippage: Slippage) -> EngineResult<Quote> {
        let mut params = vec![
            ("fromChain", request.from_chain.to_string()),
            ("toChain", request.to_chain.to_string()),
            ("fromToken", format!("{:?}", request.from_token)),
            ("toToken", format!("{:?}", request.to_token)),
            ("fromAmount", request.amount.to_string()),
            ("fromAddress", format!("{:?}", request.from_address)),
            ("toAddress", format!("{:?}", request.to_address)),
            ("slippage", slippage.as_fraction().to_string()),
        ];
        if let Some(integrator) = &self.integrator {
            params.push(("integrator", integrator.clone()));
        }

        let http_request = self
            .client
            .get(format!("{}/v1/quote", self.base_url))
            .query(&params);
        let raw: serde_json::Value = http::send_json(SOURCE_ID, http_request).await?;

        let parsed = Self::parse(&raw)?;
        let min_output_amount = parse_amount("toAmountMin", &parsed.estimate.to_amount_min)?;
        debug!("LI.FI quote via {}: min {}", parsed.tool, min_output_amount);

        Ok(Quote {
            source_id: SOURCE_ID.to_string(),
            min_output_amount,
            slippage,
            raw_route: raw,
        })
    }

    async fn build_transaction(&self, quote: &Quote, _request: &QuoteRequest) -> EngineResult<TxPlan> {
        let parsed = Self::parse(&quote.raw_route)?;
        let tx = parsed.transaction_request.ok_or_else(|| {
            EngineError::InvalidRequest("LI.FI route has no transaction request".to_string())
        })?;

        let value = match tx.value.as_deref() {
            Some(raw) => parse_amount("value", raw)?,
            None => Default::default(),
        };
        let gas_limit = tx
            .gas_limit
            .as_deref()
            .map(|raw| parse_amount("gasLimit", raw))
            .transpose()?;

        let mut steps: Vec<String> = parsed.included_steps.into_iter().map(|s| s.tool).collect();
        if steps.is_empty() {
            steps.push(parsed.tool.clone());
        }

        Ok(TxPlan {
            tx: TxRequest {
                gas_limit,
                ..TxRequest::new(tx.to, tx.data, value)
            },
            spender: parsed.estimate.approval_address.unwrap_or(tx.to),
            tool: Some(parsed.tool),
            steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::quote_request;
    use ethers::types::U256;
    use serde_json::json;

    fn route() -> serde_json::Value {
        json!({
            "id": "abc",
            "type": "lifi",
            "tool": "stargate",
            "estimate": {
                "toAmount": "1010000",
                "toAmountMin": "1000000",
                "approvalAddress": "0x1231deb6f5749ef6ce6943a275a1d3e7486f4eae"
            },
            "includedSteps": [
                { "tool": "uniswap", "type": "swap" },
                { "tool": "stargate", "type": "cross" }
            ],
            "transactionRequest": {
                "to": "0x1231deb6f5749ef6ce6943a275a1d3e7486f4eae",
                "data": "0xdeadbeef",
                "value": "0x0",
                "gasLimit": "0x30d40",
                "chainId": 1
            }
        })
    }

    #[test]
    fn test_build_from_embedded_transaction() {
        let source = LifiSource::new(LIFI_API, None, None, Duration::from_secs(1)).unwrap();
        let quote = Quote {
            source_id: SOURCE_ID.to_string(),
            min_output_amount: U256::from(1_000_000),
            slippage: Slippage::from_bps(100),
            raw_route: route(),
        };

        let plan = tokio_test::block_on(source.build_transaction(&quote, &quote_request())).unwrap();
        assert_eq!(plan.tool.as_deref(), Some("stargate"));
        assert_eq!(plan.steps, vec!["uniswap", "stargate"]);
        assert_eq!(plan.tx.gas_limit, Some(U256::from(200_000)));
        assert_eq!(plan.tx.data.to_vec(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(plan.spender, plan.tx.to);
    }

    #[test]
    fn test_missing_transaction_request_is_rejected() {
        let source = LifiSource::new(LIFI_API, None, None, Duration::from_secs(1)).unwrap();
        let mut raw = route();
        raw.as_object_mut().unwrap().remove("transactionRequest");
        let quote = Quote {
            source_id: SOURCE_ID.to_string(),
            min_output_amount: U256::from(1),
            slippage: Slippage::from_bps(100),
            raw_route: raw,
        };

        let err = tokio_test::block_on(source.build_transaction(&quote, &quote_request())).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }
}
