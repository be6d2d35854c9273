//! 0x swap API, one host per chain

use super::{api_token, parse_amount};
use crate::chain::TxRequest;
use crate::error::{EngineError, EngineResult};
use crate::http;
use crate::quotes::{Quote, QuoteRequest, QuoteSource, Slippage, TxPlan};

use async_trait::async_trait;
use ethers::types::{Address, Bytes};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const SOURCE_ID: &str = "zeroex";

/// Default host for a chain, `None` when 0x does not serve it
pub fn chain_host(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("https://api.0x.org"),
        10 => Some("https://optimism.api.0x.org"),
        56 => Some("https://bsc.api.0x.org"),
        137 => Some("https://polygon.api.0x.org"),
        8453 => Some("https://base.api.0x.org"),
        42161 => Some("https://arbitrum.api.0x.org"),
        43114 => Some("https://avalanche.api.0x.org"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZeroExQuote {
    to: Address,
    data: Bytes,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    gas: Option<String>,
    buy_amount: String,
    allowance_target: Option<Address>,
}

pub struct ZeroExSource {
    client: Client,
    /// Overrides the per-chain host when set
    base_url: Option<String>,
}

impl ZeroExSource {
    pub fn new(
        base_url: Option<String>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> EngineResult<Self> {
        let headers: Vec<(&str, &str)> = api_key.map(|k| vec![("0x-api-key", k)]).unwrap_or_default();
        Ok(Self {
            client: http::build_client(SOURCE_ID, timeout, &headers)?,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    fn host(&self, chain_id: u64) -> EngineResult<String> {
        match (&self.base_url, chain_host(chain_id)) {
            (Some(url), _) => Ok(url.clone()),
            (None, Some(host)) => Ok(host.to_string()),
            (None, None) => Err(EngineError::InvalidRequest(format!(
                "0x does not serve chain {}",
                chain_id
            ))),
        }
    }

    fn parse(raw: &serde_json::Value) -> EngineResult<ZeroExQuote> {
        serde_json::from_value(raw.clone())
            .map_err(|e| EngineError::Internal(format!("malformed 0x quote: {}", e)))
    }
}

#[async_trait]
impl QuoteSource for ZeroExSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    fn supports(&self, request: &QuoteRequest) -> bool {
        !request.is_cross_chain()
            && (self.base_url.is_some() || chain_host(request.from_chain).is_some())
    }

    async fn quote(&self, request: &QuoteRequest, slippage: Slippage) -> EngineResult<Quote> {
        let params = [
            ("sellToken", api_token(&request.from_token)),
            ("buyToken", api_token(&request.to_token)),
            ("sellAmount", request.amount.to_string()),
            ("takerAddress", format!("{:?}", request.from_address)),
            ("slippagePercentage", slippage.as_fraction().to_string()),
        ];
        let http_request = self
            .client
            .get(format!("{}/swap/v1/quote", self.host(request.from_chain)?))
            .query(&params);
        let raw: serde_json::Value = http::send_json(SOURCE_ID, http_request).await?;

        let parsed = Self::parse(&raw)?;
        let expected = parse_amount("buyAmount", &parsed.buy_amount)?;

        Ok(Quote {
            source_id: SOURCE_ID.to_string(),
            min_output_amount: slippage.min_output(expected),
            slippage,
            raw_route: raw,
        })
    }

    async fn build_transaction(&self, quote: &Quote, _request: &QuoteRequest) -> EngineResult<TxPlan> {
        let parsed = Self::parse(&quote.raw_route)?;
        let value = match parsed.value.as_deref() {
            Some(raw) => parse_amount("value", raw)?,
            None => Default::default(),
        };
        let gas_limit = parsed
            .gas
            .as_deref()
            .map(|raw| parse_amount("gas", raw))
            .transpose()?;

        Ok(TxPlan {
            tx: TxRequest {
                gas_limit,
                ..TxRequest::new(parsed.to, parsed.data, value)
            },
            spender: parsed.allowance_target.unwrap_or(parsed.to),
            tool: Some("0x".to_string()),
            steps: vec!["0x".to_string()],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::quote_request;
    use ethers::types::U256;
    use serde_json::json;

    #[test]
    fn test_supports_same_chain_on_known_hosts() {
        let source = ZeroExSource::new(None, None, Duration::from_secs(1)).unwrap();
        let mut request = quote_request();
        assert!(source.supports(&request));

        request.to_chain = 137;
        assert!(!source.supports(&request));

        request.from_chain = 250;
        request.to_chain = 250;
        assert!(!source.supports(&request));
    }

    #[test]
    fn test_build_uses_allowance_target() {
        let source = ZeroExSource::new(None, None, Duration::from_secs(1)).unwrap();
        let quote = Quote {
            source_id: SOURCE_ID.to_string(),
            min_output_amount: U256::from(990),
            slippage: Slippage::from_bps(100),
            raw_route: json!({
                "to": "0xdef1c0ded9bec7f1a1670819833240f027b25eff",
                "data": "0x1234",
                "value": "0",
                "gas": "150000",
                "buyAmount": "1000",
                "allowanceTarget": "0x0000000000000000000000000000000000000abc"
            }),
        };

        let plan = tokio_test::block_on(source.build_transaction(&quote, &quote_request())).unwrap();
        assert_eq!(plan.spender, Address::from_low_u64_be(0xabc));
        assert_eq!(plan.tx.gas_limit, Some(U256::from(150_000)));
        assert!(plan.tx.value.is_zero());
    }
}
