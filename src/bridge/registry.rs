//! In-memory registry of routes in flight
//!
//! Entries are created by `RouteRegistry::begin` and removed when the returned
//! `RouteHandle` drops, so every exit path of a bridge cleans up. Only the
//! handle can mutate its entry.

use crate::error::{EngineError, EngineResult};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteStep {
    pub tool_name: String,
    pub transaction_hashes: Vec<String>,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePhase {
    Quoting,
    AwaitingOriginConfirmation,
    Polling,
    Complete,
    Failed,
    TimedOut,
}

/// Progress of one bridge route.
///
/// `current_step_index <= total_steps` always holds, and `is_complete` is true
/// exactly when every step is done and no error is set.
#[derive(Debug, Clone, Serialize)]
pub struct RouteExecutionStatus {
    pub route_id: String,
    pub steps: Vec<RouteStep>,
    pub current_step_index: usize,
    pub total_steps: usize,
    pub is_complete: bool,
    pub error: Option<String>,
    pub phase: RoutePhase,
    pub polls: u32,
    pub last_status: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RouteExecutionStatus {
    fn new(route_id: String) -> Self {
        let now = Utc::now();
        Self {
            route_id,
            steps: Vec::new(),
            current_step_index: 0,
            total_steps: 0,
            is_complete: false,
            error: None,
            phase: RoutePhase::Quoting,
            polls: 0,
            last_status: None,
            started_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.is_complete = self.error.is_none()
            && self.total_steps > 0
            && self.current_step_index == self.total_steps;
    }

    /// Lay out the steps of the chosen route; at least one step is kept
    pub fn set_steps(&mut self, tools: &[String]) {
        let tools: Vec<String> = if tools.is_empty() {
            vec!["bridge".to_string()]
        } else {
            tools.to_vec()
        };
        self.steps = tools
            .into_iter()
            .map(|tool_name| RouteStep {
                tool_name,
                transaction_hashes: Vec::new(),
                status: StepStatus::Pending,
            })
            .collect();
        self.total_steps = self.steps.len();
        self.current_step_index = 0;
        self.touch();
    }

    /// Origin transaction mined; the first step is in progress
    pub fn record_origin(&mut self, tx_hash: String) {
        if let Some(step) = self.steps.first_mut() {
            step.transaction_hashes.push(tx_hash);
            step.status = StepStatus::InProgress;
        }
        self.phase = RoutePhase::AwaitingOriginConfirmation;
        self.touch();
    }

    pub fn record_poll(&mut self, attempt: u32, status: &str) {
        self.polls = attempt;
        self.last_status = Some(status.to_string());
        self.phase = RoutePhase::Polling;
        self.touch();
    }

    pub fn complete(&mut self, receiving_tx_hash: Option<String>) {
        for step in &mut self.steps {
            step.status = StepStatus::Done;
        }
        if let (Some(hash), Some(last)) = (receiving_tx_hash, self.steps.last_mut()) {
            if !last.transaction_hashes.contains(&hash) {
                last.transaction_hashes.push(hash);
            }
        }
        self.current_step_index = self.total_steps;
        self.phase = RoutePhase::Complete;
        self.touch();
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        if let Some(step) = self.steps.get_mut(self.current_step_index) {
            step.status = StepStatus::Failed;
        }
        self.error = Some(reason.into());
        self.phase = RoutePhase::Failed;
        self.touch();
    }

    pub fn time_out(&mut self) {
        self.phase = RoutePhase::TimedOut;
        self.touch();
    }
}

#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: DashMap<String, RouteExecutionStatus>,
}

impl RouteRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a fresh route under a new id
    pub fn begin(self: &Arc<Self>) -> RouteHandle {
        loop {
            if let Ok(handle) = self.begin_with_id(Uuid::new_v4().to_string()) {
                return handle;
            }
        }
    }

    /// Register a route under a caller-chosen id, rejecting ids already in flight
    pub fn begin_with_id(self: &Arc<Self>, id: String) -> EngineResult<RouteHandle> {
        match self.routes.entry(id.clone()) {
            Entry::Occupied(_) => {
                return Err(EngineError::InvalidRequest(format!(
                    "route {} is already in flight",
                    id
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(RouteExecutionStatus::new(id.clone()));
            }
        }
        crate::metrics::set_active_routes(self.routes.len());
        debug!("Route {} registered", id);

        Ok(RouteHandle {
            id,
            registry: Arc::clone(self),
        })
    }

    pub fn get(&self, route_id: &str) -> Option<RouteExecutionStatus> {
        self.routes.get(route_id).map(|entry| entry.value().clone())
    }

    pub fn active(&self) -> Vec<RouteExecutionStatus> {
        self.routes.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Exclusive owner of one registry entry
pub struct RouteHandle {
    id: String,
    registry: Arc<RouteRegistry>,
}

impl RouteHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn update(&self, f: impl FnOnce(&mut RouteExecutionStatus)) {
        if let Some(mut entry) = self.registry.routes.get_mut(&self.id) {
            f(entry.value_mut());
        }
    }

    pub fn snapshot(&self) -> Option<RouteExecutionStatus> {
        self.registry.get(&self.id)
    }
}

impl Drop for RouteHandle {
    fn drop(&mut self) {
        self.registry.routes.remove(&self.id);
        crate::metrics::set_active_routes(self.registry.routes.len());
        debug!("Route {} released", self.id);
    }
}
