//! Error types for the swap executor

use serde::Serialize;
use thiserror::Error;

/// Main error type for the execution engine
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown liquidity source: {0}")]
    UnknownSource(String),

    #[error("No route found at {slippage_bps} bps slippage")]
    NoRouteFound { slippage_bps: u32 },

    #[error("Slippage exceeded: {0}")]
    SlippageExceeded(String),

    #[error("Front-running detected: {0}")]
    FrontRun(String),

    #[error("Token transfer failed: {0}")]
    TransferFromFailed(String),

    #[error("Transaction {tx_hash} reverted on chain {chain_id}")]
    OnChainRevert { chain_id: u64, tx_hash: String },

    #[error("Execution reverted: {0}")]
    Reverted(String),

    #[error("Approval failed: {0}")]
    ApprovalFailed(String),

    #[error("Network error: {0}")]
    NetworkOrTimeout(String),

    #[error("Timeout waiting for receipt of {tx_hash} on chain {chain_id}")]
    ReceiptTimeout { chain_id: u64, tx_hash: String },

    #[error("Broadcast of {tx_hash} on chain {chain_id} unconfirmed: {reason}")]
    SubmissionUnknown {
        chain_id: u64,
        tx_hash: String,
        reason: String,
    },

    #[error("Route from {source_id} unusable: {message}")]
    RouteUnusable { source_id: String, message: String },

    #[error("HTTP error from {source_id}: {message}")]
    Http { source_id: String, message: String },

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Chain {chain_id} not found")]
    ChainNotFound { chain_id: u64 },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Bridge transfer {tx_hash} failed on destination: {reason}")]
    BridgeFailed { tx_hash: String, reason: String },

    #[error("Bridge status for {tx_hash} still unknown after {attempts} polls")]
    BridgeStatusTimeout { tx_hash: String, attempts: u32 },

    #[error("{last} (after {attempts} attempts)")]
    Exhausted {
        attempts: u32,
        last: Box<EngineError>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure classes driving the escalation decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    NoRouteFound,
    SlippageExceeded,
    OnChainRevert,
    FrontRun,
    TransferFromFailed,
    ApprovalFailed,
    NetworkOrTimeout,
    /// The source could not turn its own quote into a transaction
    RouteUnusable,
    /// A transaction was broadcast and its fate is unknown
    InFlightUnknown,
    BridgeFailed,
    BridgeStatusTimeout,
    UnknownSource,
    InvalidRequest,
    Fatal,
}

impl ErrorClass {
    /// Whether another quote may be attempted after this failure
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClass::SlippageExceeded
                | ErrorClass::OnChainRevert
                | ErrorClass::FrontRun
                | ErrorClass::TransferFromFailed
                | ErrorClass::ApprovalFailed
                | ErrorClass::NetworkOrTimeout
                | ErrorClass::RouteUnusable
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::NoRouteFound => "no_route_found",
            ErrorClass::SlippageExceeded => "slippage_exceeded",
            ErrorClass::OnChainRevert => "on_chain_revert",
            ErrorClass::FrontRun => "front_run",
            ErrorClass::TransferFromFailed => "transfer_from_failed",
            ErrorClass::ApprovalFailed => "approval_failed",
            ErrorClass::NetworkOrTimeout => "network_or_timeout",
            ErrorClass::RouteUnusable => "route_unusable",
            ErrorClass::InFlightUnknown => "in_flight_unknown",
            ErrorClass::BridgeFailed => "bridge_failed",
            ErrorClass::BridgeStatusTimeout => "bridge_status_timeout",
            ErrorClass::UnknownSource => "unknown_source",
            ErrorClass::InvalidRequest => "invalid_request",
            ErrorClass::Fatal => "fatal",
        }
    }
}

impl EngineError {
    /// Classify this error for retry decisions
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::NoRouteFound { .. } => ErrorClass::NoRouteFound,
            EngineError::SlippageExceeded(_) => ErrorClass::SlippageExceeded,
            EngineError::FrontRun(_) => ErrorClass::FrontRun,
            EngineError::TransferFromFailed(_) => ErrorClass::TransferFromFailed,
            EngineError::OnChainRevert { .. } | EngineError::Reverted(_) => {
                ErrorClass::OnChainRevert
            }
            EngineError::ApprovalFailed(_) => ErrorClass::ApprovalFailed,
            EngineError::NetworkOrTimeout(_)
            | EngineError::Http { .. }
            | EngineError::ChainConnection { .. } => ErrorClass::NetworkOrTimeout,
            EngineError::RouteUnusable { .. } => ErrorClass::RouteUnusable,
            EngineError::ReceiptTimeout { .. } | EngineError::SubmissionUnknown { .. } => {
                ErrorClass::InFlightUnknown
            }
            EngineError::BridgeFailed { .. } => ErrorClass::BridgeFailed,
            EngineError::BridgeStatusTimeout { .. } => ErrorClass::BridgeStatusTimeout,
            EngineError::UnknownSource(_) => ErrorClass::UnknownSource,
            EngineError::InvalidRequest(_) | EngineError::ChainNotFound { .. } => {
                ErrorClass::InvalidRequest
            }
            EngineError::Exhausted { last, .. } => last.class(),
            EngineError::Config(_) | EngineError::Wallet(_) | EngineError::Internal(_) => {
                ErrorClass::Fatal
            }
        }
    }

    /// True when a value-carrying transaction may already be on the origin chain.
    /// Callers must not resubmit the request in that case.
    pub fn origin_submitted(&self) -> bool {
        match self {
            EngineError::ReceiptTimeout { .. }
            | EngineError::SubmissionUnknown { .. }
            | EngineError::BridgeFailed { .. }
            | EngineError::BridgeStatusTimeout { .. } => true,
            EngineError::Exhausted { last, .. } => last.origin_submitted(),
            _ => false,
        }
    }

    /// Build an error from a raw node or aggregator message
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match classify_message(&message) {
            ErrorClass::SlippageExceeded => EngineError::SlippageExceeded(message),
            ErrorClass::FrontRun => EngineError::FrontRun(message),
            ErrorClass::TransferFromFailed => EngineError::TransferFromFailed(message),
            ErrorClass::OnChainRevert => EngineError::Reverted(message),
            _ => EngineError::NetworkOrTimeout(message),
        }
    }
}

/// Map a raw revert or RPC error string onto a failure class
pub fn classify_message(message: &str) -> ErrorClass {
    let msg = message.to_lowercase();

    if msg.contains("too little received")
        || msg.contains("return amount is not enough")
        || msg.contains("insufficient_output_amount")
        || msg.contains("slippage")
        || msg.contains("price impact")
    {
        ErrorClass::SlippageExceeded
    } else if msg.contains("transfer_from_failed")
        || msg.contains("transferfrom")
        || msg.contains("transfer amount exceeds allowance")
    {
        ErrorClass::TransferFromFailed
    } else if msg.contains("front-run")
        || msg.contains("frontrun")
        || msg.contains("front run")
        || msg.contains("sandwich")
    {
        ErrorClass::FrontRun
    } else if msg.contains("revert") {
        ErrorClass::OnChainRevert
    } else {
        ErrorClass::NetworkOrTimeout
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
