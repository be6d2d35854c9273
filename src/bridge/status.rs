//! Cross-chain transfer status lookups

use crate::error::EngineResult;
use crate::http;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const STATUS_SERVICE: &str = "lifi-status";
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Identifies one transfer for the status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusQuery {
    pub tx_hash: String,
    pub from_chain: u64,
    pub to_chain: u64,
    /// Bridge tool that carried the transfer; some tools are only found with it
    pub tool: Option<String>,
}

/// Status as reported by the endpoint
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BridgeStatus {
    /// `PENDING`, `DONE`, `FAILED`, `NOT_FOUND`, ...
    pub status: String,
    pub substatus: Option<String>,
    pub substatus_message: Option<String>,
    pub receiving_tx_hash: Option<String>,
}

/// What a single status reading means for the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Complete,
    Failed(String),
    Pending,
}

impl BridgeStatus {
    pub fn outcome(&self) -> PollOutcome {
        match self.status.as_str() {
            "DONE" => PollOutcome::Complete,
            "FAILED" => PollOutcome::Failed(self.failure_reason()),
            _ => PollOutcome::Pending,
        }
    }

    fn failure_reason(&self) -> String {
        match (&self.substatus, &self.substatus_message) {
            (Some(substatus), Some(message)) => format!("{}: {}", substatus, message),
            (Some(substatus), None) => substatus.clone(),
            (None, Some(message)) => message.clone(),
            (None, None) => "bridge reported FAILED".to_string(),
        }
    }

    pub fn report(&self) -> StatusReport {
        let outcome = self.outcome();
        StatusReport {
            status: self.status.clone(),
            is_complete: outcome == PollOutcome::Complete,
            is_failed: matches!(outcome, PollOutcome::Failed(_)),
            is_pending: outcome == PollOutcome::Pending,
            error: match outcome {
                PollOutcome::Failed(reason) => Some(reason),
                _ => None,
            },
        }
    }
}

/// Stateless status answer for callers outside an in-flight bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub status: String,
    pub is_complete: bool,
    pub is_failed: bool,
    pub is_pending: bool,
    pub error: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusClient: Send + Sync {
    async fn status(&self, query: &StatusQuery) -> EngineResult<BridgeStatus>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiStatusResponse {
    status: String,
    substatus: Option<String>,
    substatus_message: Option<String>,
    receiving: Option<LifiTransferLeg>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiTransferLeg {
    tx_hash: Option<String>,
}

/// LI.FI `/v1/status`
pub struct LifiStatusClient {
    client: Client,
    base_url: String,
}

impl LifiStatusClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<&str>) -> EngineResult<Self> {
        let headers: Vec<(&str, &str)> = api_key
            .map(|k| vec![("x-lifi-api-key", k)])
            .unwrap_or_default();
        Ok(Self {
            client: http::build_client(STATUS_SERVICE, STATUS_TIMEOUT, &headers)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl StatusClient for LifiStatusClient {
    async fn status(&self, query: &StatusQuery) -> EngineResult<BridgeStatus> {
        let mut params = vec![
            ("txHash", query.tx_hash.clone()),
            ("fromChain", query.from_chain.to_string()),
            ("toChain", query.to_chain.to_string()),
        ];
        if let Some(tool) = &query.tool {
            params.push(("bridge", tool.clone()));
        }

        let request = self
            .client
            .get(format!("{}/v1/status", self.base_url))
            .query(&params);
        let response: LifiStatusResponse = http::send_json(STATUS_SERVICE, request).await?;

        Ok(BridgeStatus {
            status: response.status,
            substatus: response.substatus,
            substatus_message: response.substatus_message,
            receiving_tx_hash: response.receiving.and_then(|leg| leg.tx_hash),
        })
    }
}
