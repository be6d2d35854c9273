//! Cross-chain completion tracking
//!
//! A bridge is done on the origin chain once its transaction is mined; the
//! destination leg is followed here by polling a status endpoint while the
//! route's progress stays queryable in the registry.

mod registry;
mod status;
mod tracker;

pub use registry::{
    RouteExecutionStatus, RouteHandle, RoutePhase, RouteRegistry, RouteStep, StepStatus,
};
pub use status::{
    BridgeStatus, LifiStatusClient, PollOutcome, StatusClient, StatusQuery, StatusReport,
};
pub use tracker::{
    CompletionTracker, PollPolicy, TrackerState, TrackingOutcome, MAX_POLL_ATTEMPTS,
    POLL_INTERVAL,
};

#[cfg(test)]
pub use status::MockStatusClient;
