//! Upstream symbol -> token metadata lookups

use crate::error::EngineResult;
use crate::http;

use async_trait::async_trait;
use ethers::types::Address;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Metadata for one token on one chain
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
}

/// Symbol or address lookup service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenDirectory: Send + Sync {
    async fn lookup(&self, chain_id: u64, token: &str) -> EngineResult<TokenInfo>;
}

/// LI.FI `/v1/token` endpoint
pub struct LifiTokenDirectory {
    client: Client,
    base_url: String,
}

const LIFI_TOKEN_TIMEOUT: Duration = Duration::from_secs(5);

impl LifiTokenDirectory {
    pub fn new(base_url: impl Into<String>, api_key: Option<&str>) -> EngineResult<Self> {
        let headers: Vec<(&str, &str)> = api_key
            .map(|k| vec![("x-lifi-api-key", k)])
            .unwrap_or_default();
        Ok(Self {
            client: http::build_client("lifi-tokens", LIFI_TOKEN_TIMEOUT, &headers)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TokenDirectory for LifiTokenDirectory {
    async fn lookup(&self, chain_id: u64, token: &str) -> EngineResult<TokenInfo> {
        let request = self
            .client
            .get(format!("{}/v1/token", self.base_url))
            .query(&[("chain", chain_id.to_string()), ("token", token.to_string())]);

        http::send_json("lifi-tokens", request).await
    }
}
