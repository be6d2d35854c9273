//! One-way progress events for callers that want to follow a request

use ethers::types::{Address, H256, U256};
use serde::Serialize;
use tokio::sync::mpsc;

/// Milestones of a swap or bridge, in the order they can occur
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    RouteStarted {
        route_id: String,
    },
    ApprovalSubmitted {
        chain_id: u64,
        tx_hash: H256,
        spender: Address,
        amount: U256,
    },
    TransactionSubmitted {
        chain_id: u64,
        tx_hash: H256,
    },
    OriginConfirmed {
        route_id: String,
        tx_hash: H256,
    },
    StatusPolled {
        route_id: String,
        attempt: u32,
        status: String,
    },
    Completed {
        route_id: String,
        receiving_tx_hash: Option<String>,
    },
    Failed {
        route_id: String,
        reason: String,
    },
    TimedOut {
        route_id: String,
        attempts: u32,
    },
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Optional subscriber; a dropped receiver is not an error
#[derive(Debug, Clone, Default)]
pub struct Progress {
    sender: Option<ProgressSender>,
}

impl Progress {
    pub fn new(sender: Option<ProgressSender>) -> Self {
        Self { sender }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_ignores_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        Progress::new(Some(tx)).emit(ProgressEvent::RouteStarted {
            route_id: "r".into(),
        });
        Progress::none().emit(ProgressEvent::RouteStarted {
            route_id: "r".into(),
        });
    }

    #[test]
    fn test_events_serialize_with_tag() {
        let json = serde_json::to_value(ProgressEvent::StatusPolled {
            route_id: "r".into(),
            attempt: 3,
            status: "PENDING".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "status_polled");
        assert_eq!(json["attempt"], 3);
    }
}
