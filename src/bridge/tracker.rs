//! Polls the status endpoint until the destination leg settles

use super::registry::RouteHandle;
use super::status::{PollOutcome, StatusClient, StatusQuery};
use crate::progress::{Progress, ProgressEvent};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Delay between status polls
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Polls before giving up; 60 x 5s is five minutes
pub const MAX_POLL_ATTEMPTS: u32 = 60;

#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            max_attempts: MAX_POLL_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    AwaitingOriginConfirmation,
    Polling { attempt: u32 },
    Complete,
    Failed,
    TimedOut,
}

/// Terminal result of tracking one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingOutcome {
    Complete {
        receiving_tx_hash: Option<String>,
        polls: u32,
    },
    Failed {
        reason: String,
        polls: u32,
    },
    /// Destination unknown; the origin transaction already succeeded
    TimedOut { polls: u32 },
}

pub struct CompletionTracker {
    client: Arc<dyn StatusClient>,
    policy: PollPolicy,
}

impl CompletionTracker {
    pub fn new(client: Arc<dyn StatusClient>, policy: PollPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    fn enter(route: &RouteHandle, state: &mut TrackerState, next: TrackerState) {
        debug!("Route {} tracker {:?} -> {:?}", route.id(), state, next);
        *state = next;
    }

    /// Poll until `DONE`, `FAILED` or `max_attempts` polls.
    ///
    /// Poll errors are logged and counted against the attempt budget. There is
    /// no sleep after the last poll, so this returns within
    /// `(max_attempts - 1) x interval` plus request time.
    pub async fn track(
        &self,
        query: &StatusQuery,
        route: &RouteHandle,
        progress: &Progress,
    ) -> TrackingOutcome {
        let mut state = TrackerState::AwaitingOriginConfirmation;
        let route_id = route.id().to_string();
        info!(
            "Tracking {} from chain {} to {} via {:?}",
            query.tx_hash, query.from_chain, query.to_chain, query.tool
        );

        for attempt in 1..=self.policy.max_attempts {
            Self::enter(route, &mut state, TrackerState::Polling { attempt });

            match self.client.status(query).await {
                Ok(status) => {
                    crate::metrics::record_bridge_poll(&status.status);
                    route.update(|s| s.record_poll(attempt, &status.status));
                    progress.emit(ProgressEvent::StatusPolled {
                        route_id: route_id.clone(),
                        attempt,
                        status: status.status.clone(),
                    });

                    match status.outcome() {
                        PollOutcome::Complete => {
                            Self::enter(route, &mut state, TrackerState::Complete);
                            info!("Route {} complete after {} polls", route_id, attempt);
                            crate::metrics::record_bridge_outcome("complete");
                            route.update(|s| s.complete(status.receiving_tx_hash.clone()));
                            progress.emit(ProgressEvent::Completed {
                                route_id,
                                receiving_tx_hash: status.receiving_tx_hash.clone(),
                            });
                            return TrackingOutcome::Complete {
                                receiving_tx_hash: status.receiving_tx_hash,
                                polls: attempt,
                            };
                        }
                        PollOutcome::Failed(reason) => {
                            Self::enter(route, &mut state, TrackerState::Failed);
                            error!("Route {} failed on destination: {}", route_id, reason);
                            crate::metrics::record_bridge_outcome("failed");
                            route.update(|s| s.fail(reason.clone()));
                            progress.emit(ProgressEvent::Failed {
                                route_id,
                                reason: reason.clone(),
                            });
                            return TrackingOutcome::Failed {
                                reason,
                                polls: attempt,
                            };
                        }
                        PollOutcome::Pending => {
                            debug!(
                                "Route {} poll {}/{}: {} {:?}",
                                route_id,
                                attempt,
                                self.policy.max_attempts,
                                status.status,
                                status.substatus
                            );
                        }
                    }
                }
                Err(e) => {
                    crate::metrics::record_bridge_poll("error");
                    route.update(|s| s.record_poll(attempt, "ERROR"));
                    warn!("Route {} status poll {} failed: {}", route_id, attempt, e);
                }
            }

            if attempt < self.policy.max_attempts {
                sleep(self.policy.interval).await;
            }
        }

        Self::enter(route, &mut state, TrackerState::TimedOut);
        warn!(
            "Route {} still unsettled after {} polls",
            route_id, self.policy.max_attempts
        );
        crate::metrics::record_bridge_outcome("timed_out");
        route.update(|s| s.time_out());
        progress.emit(ProgressEvent::TimedOut {
            route_id,
            attempts: self.policy.max_attempts,
        });
        TrackingOutcome::TimedOut {
            polls: self.policy.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::registry::{RouteRegistry, StepStatus};
    use crate::bridge::status::{BridgeStatus, MockStatusClient};
    use crate::error::EngineError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn query() -> StatusQuery {
        StatusQuery {
            tx_hash: "0xabc".into(),
            from_chain: 1,
            to_chain: 137,
            tool: Some("stargate".into()),
        }
    }

    fn status(raw: &str) -> BridgeStatus {
        BridgeStatus {
            status: raw.to_string(),
            ..Default::default()
        }
    }

    /// Mock answering `PENDING` until poll `done_on`, then `DONE`
    fn done_on(done_on: u32) -> (MockStatusClient, Arc<AtomicU32>) {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = polls.clone();
        let mut client = MockStatusClient::new();
        client.expect_status().returning(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(if n >= done_on {
                BridgeStatus {
                    receiving_tx_hash: Some("0xdest".into()),
                    ..status("DONE")
                }
            } else {
                status("PENDING")
            })
        });
        (client, polls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_on_last_poll_completes() {
        let (client, polls) = done_on(60);
        let tracker = CompletionTracker::new(Arc::new(client), PollPolicy::default());
        let registry = RouteRegistry::new();
        let route = registry.begin();
        route.update(|s| s.set_steps(&["stargate".into()]));
        let started = Instant::now();

        let outcome = tracker.track(&query(), &route, &Progress::none()).await;

        assert_eq!(
            outcome,
            TrackingOutcome::Complete {
                receiving_tx_hash: Some("0xdest".into()),
                polls: 60
            }
        );
        assert_eq!(polls.load(Ordering::SeqCst), 60);
        assert_eq!(started.elapsed(), POLL_INTERVAL * 59);

        let snapshot = route.snapshot().unwrap();
        assert!(snapshot.is_complete);
        assert_eq!(snapshot.polls, 60);
        assert_eq!(snapshot.steps[0].status, StepStatus::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_forever_times_out_not_fails() {
        let (client, polls) = done_on(u32::MAX);
        let policy = PollPolicy::default();
        let tracker = CompletionTracker::new(Arc::new(client), policy);
        let registry = RouteRegistry::new();
        let route = registry.begin();
        let started = Instant::now();

        let outcome = tracker.track(&query(), &route, &Progress::none()).await;

        assert_eq!(outcome, TrackingOutcome::TimedOut { polls: 60 });
        assert_eq!(polls.load(Ordering::SeqCst), 60);
        assert!(started.elapsed() <= policy.interval * policy.max_attempts);
        let snapshot = route.snapshot().unwrap();
        assert!(snapshot.error.is_none());
        assert!(!snapshot.is_complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_carries_substatus() {
        let mut client = MockStatusClient::new();
        client.expect_status().times(1).returning(|_| {
            Ok(BridgeStatus {
                substatus: Some("REFUNDED".into()),
                ..status("FAILED")
            })
        });
        let tracker = CompletionTracker::new(Arc::new(client), PollPolicy::default());
        let registry = RouteRegistry::new();
        let route = registry.begin();

        let outcome = tracker.track(&query(), &route, &Progress::none()).await;

        assert_eq!(
            outcome,
            TrackingOutcome::Failed {
                reason: "REFUNDED".into(),
                polls: 1
            }
        );
        assert_eq!(route.snapshot().unwrap().error.as_deref(), Some("REFUNDED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_are_swallowed() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut client = MockStatusClient::new();
        client.expect_status().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(EngineError::NetworkOrTimeout("connection reset".into()))
            } else {
                Ok(status("DONE"))
            }
        });
        let tracker = CompletionTracker::new(
            Arc::new(client),
            PollPolicy {
                interval: Duration::from_secs(1),
                max_attempts: 5,
            },
        );
        let registry = RouteRegistry::new();
        let route = registry.begin();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let outcome = tracker.track(&query(), &route, &Progress::new(Some(tx))).await;

        assert!(matches!(outcome, TrackingOutcome::Complete { polls: 4, .. }));
        assert!(matches!(
            rx.try_recv(),
            Ok(ProgressEvent::StatusPolled { attempt: 4, .. })
        ));
        assert!(matches!(rx.try_recv(), Ok(ProgressEvent::Completed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_until_budget_spent_time_out() {
        let mut client = MockStatusClient::new();
        client
            .expect_status()
            .times(3)
            .returning(|_| Err(EngineError::NetworkOrTimeout("down".into())));
        let tracker = CompletionTracker::new(
            Arc::new(client),
            PollPolicy {
                interval: Duration::from_secs(1),
                max_attempts: 3,
            },
        );
        let registry = RouteRegistry::new();
        let route = registry.begin();

        let outcome = tracker.track(&query(), &route, &Progress::none()).await;
        assert_eq!(outcome, TrackingOutcome::TimedOut { polls: 3 });
    }
}
