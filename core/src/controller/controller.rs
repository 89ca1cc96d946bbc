//! Controller lifecycle management
//!
//! Single source of truth for which compute backends exist and whether
//! the system considers them reachable. One controller exists per
//! running process; tests force-reset it for isolation.
//!
//! Startup fans out one reachability check per compute so a single
//! offline backend never stalls the others, and a failed check marks
//! the compute degraded instead of aborting: the system comes up and
//! allows later reconnection rather than failing closed.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::compute::{ComputeDescriptor, ComputeTransport};
use crate::errors::{CoreError, Result};

static CONTROLLER_INSTANCE: Lazy<Mutex<Option<Arc<Controller>>>> =
    Lazy::new(|| Mutex::new(None));

/// Process-wide lifecycle state, strictly monotonic in production.
///
/// Only the test-only `Controller::reset` returns to `NotStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Whether a compute's last reachability check succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeStatus {
    Connected,
    Degraded,
}

/// Session bookkeeping for one known compute
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeSession {
    pub descriptor: ComputeDescriptor,
    pub status: ComputeStatus,
    pub last_error: Option<String>,
}

/// The system's top-level singleton
pub struct Controller {
    state: Mutex<LifecycleState>,
    computes: RwLock<HashMap<String, ComputeSession>>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState::NotStarted),
            computes: RwLock::new(HashMap::new()),
        }
    }

    /// Get the process-wide singleton.
    pub fn instance() -> Arc<Controller> {
        let mut guard = CONTROLLER_INSTANCE
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        guard.get_or_insert_with(|| Arc::new(Controller::new())).clone()
    }

    /// Drop the singleton so the next `instance` call creates a fresh
    /// controller in `NotStarted`. Reserved for test harnesses.
    pub fn reset() {
        let mut guard = CONTROLLER_INSTANCE
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != from {
            return Err(CoreError::SequencingViolation(format!(
                "controller transition to {:?} requires {:?}, current state is {:?}",
                to, from, *state
            )));
        }
        *state = to;
        Ok(())
    }

    /// Start the controller with the authoritative compute list.
    ///
    /// Every descriptor is recorded before any connection attempt, so
    /// the compute set is complete even while checks are in flight.
    /// Reachability checks run as independent tasks capped by
    /// `connect_timeout`; a failure is a warning and the compute is
    /// marked degraded, eligible for retry by request-time code.
    pub async fn start(
        &self,
        descriptors: Vec<ComputeDescriptor>,
        transport: Arc<dyn ComputeTransport>,
        connect_timeout: Duration,
    ) -> Result<()> {
        self.transition(LifecycleState::NotStarted, LifecycleState::Starting)?;

        {
            let mut computes = self.computes.write().await;
            for descriptor in &descriptors {
                computes.insert(
                    descriptor.compute_id.clone(),
                    ComputeSession {
                        descriptor: descriptor.clone(),
                        status: ComputeStatus::Degraded,
                        last_error: Some("connection pending".to_string()),
                    },
                );
            }
        }

        let mut tasks = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let transport = Arc::clone(&transport);
            let compute_id = descriptor.compute_id.clone();
            let task = tokio::spawn(async move {
                match tokio::time::timeout(connect_timeout, transport.connect(&descriptor)).await {
                    Ok(result) => result,
                    Err(_) => Err(CoreError::BackendUnreachable(format!(
                        "{}: connection attempt timed out",
                        descriptor.display_name()
                    ))),
                }
            });
            tasks.push((compute_id, task));
        }

        for (compute_id, task) in tasks {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => Err(CoreError::BackendUnreachable(format!(
                    "connection task failed: {}",
                    e
                ))),
            };

            let mut computes = self.computes.write().await;
            if let Some(session) = computes.get_mut(&compute_id) {
                match result {
                    Ok(()) => {
                        info!(compute = %compute_id, "compute connected");
                        session.status = ComputeStatus::Connected;
                        session.last_error = None;
                    }
                    Err(e) => {
                        warn!(compute = %compute_id, error = %e, "compute unreachable, continuing degraded");
                        session.status = ComputeStatus::Degraded;
                        session.last_error = Some(e.to_string());
                    }
                }
            }
        }

        self.transition(LifecycleState::Starting, LifecycleState::Running)?;
        info!(computes = self.compute_count().await, "controller started");
        Ok(())
    }

    /// Stop the controller and drop all tracked compute sessions.
    ///
    /// Idempotent: a second call is a no-op. Calling stop on a
    /// controller that never started is a sequencing bug.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match *state {
                LifecycleState::Stopped | LifecycleState::Stopping => return Ok(()),
                LifecycleState::NotStarted => {
                    return Err(CoreError::SequencingViolation(
                        "controller stop invoked before start".to_string(),
                    ))
                }
                LifecycleState::Starting | LifecycleState::Running => {
                    *state = LifecycleState::Stopping;
                }
            }
        }

        let dropped = {
            let mut computes = self.computes.write().await;
            let count = computes.len();
            computes.clear();
            count
        };

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = LifecycleState::Stopped;
        info!(sessions = dropped, "controller stopped");
        Ok(())
    }

    /// Snapshot of every tracked compute session.
    pub async fn computes(&self) -> Vec<ComputeSession> {
        let computes = self.computes.read().await;
        let mut sessions: Vec<ComputeSession> = computes.values().cloned().collect();
        sessions.sort_by(|a, b| a.descriptor.compute_id.cmp(&b.descriptor.compute_id));
        sessions
    }

    pub async fn compute(&self, compute_id: &str) -> Result<ComputeSession> {
        let computes = self.computes.read().await;
        computes
            .get(compute_id)
            .cloned()
            .ok_or_else(|| CoreError::ComputeNotFound(compute_id.to_string()))
    }

    pub async fn compute_count(&self) -> usize {
        self.computes.read().await.len()
    }
}
