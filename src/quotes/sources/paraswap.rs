//! ParaSwap: price route first, transaction built in a second call

use super::{api_token, parse_amount};
use crate::chain::TxRequest;
use crate::error::{EngineError, EngineResult};
use crate::http;
use crate::quotes::{Quote, QuoteRequest, QuoteSource, Slippage, TxPlan};

use async_trait::async_trait;
use ethers::types::{Address, Bytes};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const PARASWAP_API: &str = "https://apiv5.paraswap.io";

const SOURCE_ID: &str = "paraswap";
const DEFAULT_PARTNER: &str = "swap-executor";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceResponse {
    price_route: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceRoute {
    dest_amount: String,
    token_transfer_proxy: Option<Address>,
}

#[derive(Debug, Deserialize)]
struct ParaswapTransaction {
    to: Address,
    data: Bytes,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    gas: Option<String>,
}

pub struct ParaswapSource {
    client: Client,
    base_url: String,
    partner: String,
}

impl ParaswapSource {
    pub fn new(
        base_url: impl Into<String>,
        integrator: Option<String>,
        timeout: Duration,
    ) -> EngineResult<Self> {
        Ok(Self {
            client: http::build_client(SOURCE_ID, timeout, &[])?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            partner: integrator.unwrap_or_else(|| DEFAULT_PARTNER.to_string()),
        })
    }

    fn price_route(raw: &serde_json::Value) -> EngineResult<PriceRoute> {
        serde_json::from_value(raw.clone())
            .map_err(|e| EngineError::Internal(format!("malformed ParaSwap price route: {}", e)))
    }
}

#[async_trait]
impl QuoteSource for ParaswapSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn quote(&self, request: &QuoteRequest, slippage: Slippage) -> EngineResult<Quote> {
        let params = [
            ("srcToken", api_token(&request.from_token)),
            ("destToken", api_token(&request.to_token)),
            ("amount", request.amount.to_string()),
            ("srcDecimals", request.from_decimals.to_string()),
            ("destDecimals", request.to_decimals.to_string()),
            ("side", "SELL".to_string()),
            ("network", request.from_chain.to_string()),
            ("userAddress", format!("{:?}", request.from_address)),
            ("partner", self.partner.clone()),
        ];
        let http_request = self
            .client
            .get(format!("{}/prices", self.base_url))
            .query(&params);
        let response: PriceResponse = http::send_json(SOURCE_ID, http_request).await?;

        let route = Self::price_route(&response.price_route)?;
        let expected = parse_amount("destAmount", &route.dest_amount)?;

        Ok(Quote {
            source_id: SOURCE_ID.to_string(),
            min_output_amount: slippage.min_output(expected),
            slippage,
            raw_route: response.price_route,
        })
    }

    async fn build_transaction(&self, quote: &Quote, request: &QuoteRequest) -> EngineResult<TxPlan> {
        let route = Self::price_route(&quote.raw_route)?;

        let body = json!({
            "srcToken": api_token(&request.from_token),
            "destToken": api_token(&request.to_token),
            "srcAmount": request.amount.to_string(),
            "slippage": quote.slippage.bps(),
            "priceRoute": quote.raw_route,
            "userAddress": format!("{:?}", request.from_address),
            "receiver": format!("{:?}", request.to_address),
            "partner": self.partner,
            "srcDecimals": request.from_decimals,
            "destDecimals": request.to_decimals,
        });
        let http_request = self
            .client
            .post(format!("{}/transactions/{}", self.base_url, request.from_chain))
            .query(&[("ignoreChecks", "true")])
            .json(&body);
        let tx: ParaswapTransaction = http::send_json(SOURCE_ID, http_request).await?;

        let value = match tx.value.as_deref() {
            Some(raw) => parse_amount("value", raw)?,
            None => Default::default(),
        };
        let gas_limit = tx
            .gas
            .as_deref()
            .map(|raw| parse_amount("gas", raw))
            .transpose()?;

        Ok(TxPlan {
            tx: TxRequest {
                gas_limit,
                ..TxRequest::new(tx.to, tx.data, value)
            },
            spender: route.token_transfer_proxy.unwrap_or(tx.to),
            tool: Some("paraswap".to_string()),
            steps: vec!["paraswap".to_string()],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::quote_request;

    #[test]
    fn test_same_chain_only() {
        let source = ParaswapSource::new(PARASWAP_API, None, Duration::from_secs(1)).unwrap();
        let mut request = quote_request();
        assert!(source.supports(&request));
        request.to_chain = 10;
        assert!(!source.supports(&request));
    }

    #[test]
    fn test_price_route_fields() {
        let route = ParaswapSource::price_route(&json!({
            "destAmount": "2500000",
            "tokenTransferProxy": "0x216b4b4ba9f3e719726886d34a177484278bfcae",
            "bestRoute": []
        }))
        .unwrap();
        assert_eq!(route.dest_amount, "2500000");
        assert!(route.token_transfer_proxy.is_some());

        assert!(ParaswapSource::price_route(&json!({ "bestRoute": [] })).is_err());
    }
}
