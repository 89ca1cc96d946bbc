//! Startup/shutdown sequencing
//!
//! Encodes the one ordering that brings the system up without using an
//! unready dependency and down without leaking resources:
//!
//! Startup: store connect -> compute list -> controller -> detached
//! background jobs -> allocator + modules -> keep-alive. Only a store
//! failure is fatal; everything downstream degrades per backend.
//!
//! Shutdown: transport pool -> controller -> modules -> leaked-port
//! report. Every step runs even when an earlier one fails.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::compute::{ComputeStore, ComputeTransport};
use crate::config::CoreConfig;
use crate::controller::{Controller, LifecycleState};
use crate::errors::{CoreError, Result};
use crate::lifecycle::KeepAlive;
use crate::module::ModuleRegistry;
use crate::port::{PortAllocator, Protocol};

/// A best-effort task scheduled at startup and never awaited.
///
/// Launch-and-forget: the outcome is observed only through the log and
/// can never affect the startup result.
pub struct BackgroundJob {
    name: String,
    job: Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>,
}

impl BackgroundJob {
    pub fn new<F>(name: &str, job: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            job: Box::pin(job),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Orchestrates the startup and shutdown of the whole core
pub struct LifecycleSequencer {
    config: CoreConfig,
    store: Arc<dyn ComputeStore>,
    transport: Arc<dyn ComputeTransport>,
    background_jobs: Vec<BackgroundJob>,
    keepalive_task: Option<JoinHandle<()>>,
    state: LifecycleState,
}

impl LifecycleSequencer {
    pub fn new(
        config: CoreConfig,
        store: Arc<dyn ComputeStore>,
        transport: Arc<dyn ComputeTransport>,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            background_jobs: Vec::new(),
            keepalive_task: None,
            state: LifecycleState::NotStarted,
        }
    }

    /// Queue a job to be detached during startup step 4.
    pub fn add_background_job(&mut self, job: BackgroundJob) {
        self.background_jobs.push(job);
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Bring the system into a consistent running state.
    ///
    /// Returns an error only for fatal conditions: a persistence
    /// failure (nothing downstream can proceed without the compute
    /// list) or a sequencing bug. Per-backend failures are logged and
    /// leave the affected backend degraded.
    pub async fn startup(&mut self) -> Result<()> {
        if self.state != LifecycleState::NotStarted {
            return Err(CoreError::SequencingViolation(format!(
                "startup invoked in state {:?}",
                self.state
            )));
        }
        self.state = LifecycleState::Starting;
        info!("starting core services");

        // Step 1: persistence connection, the only fatal failure point
        if let Err(e) = self.store.connect().await {
            error!(error = %e, "compute store connection failed, aborting startup");
            self.state = LifecycleState::Stopped;
            return Err(e);
        }

        // Step 2: authoritative compute list
        let computes = match self.store.load_computes().await {
            Ok(computes) => computes,
            Err(e) => {
                error!(error = %e, "failed to load compute descriptors, aborting startup");
                self.state = LifecycleState::Stopped;
                return Err(e);
            }
        };

        // Step 3: controller owns the computes and their sessions
        Controller::instance()
            .start(computes, Arc::clone(&self.transport), self.config.connect_timeout())
            .await?;

        // Step 4: detach the best-effort jobs, outcome observed via log only
        for job in self.background_jobs.drain(..) {
            let name = job.name.clone();
            debug!(job = %name, "detaching background job");
            tokio::spawn(async move {
                match job.job.await {
                    Ok(()) => debug!(job = %name, "background job finished"),
                    Err(e) => warn!(job = %name, error = %e, "background job failed"),
                }
            });
        }

        // Step 5: the allocator must exist before any module runs
        let allocator = PortAllocator::initialize(&self.config);
        ModuleRegistry::instance()
            .load_all(allocator, self.config.module_start_timeout())
            .await;

        // Step 6: keep the loop responsive where signals cannot wake it
        self.keepalive_task =
            KeepAlive::for_platform(self.config.keepalive_interval()).spawn();

        self.state = LifecycleState::Running;
        info!("core services running");
        Ok(())
    }

    /// Tear the system down without leaking resources.
    ///
    /// Best-effort: each step runs regardless of earlier failures.
    /// A second call is a no-op; a call before startup completed is a
    /// sequencing bug.
    pub async fn shutdown(&mut self) -> Result<()> {
        match self.state {
            LifecycleState::Running => {}
            LifecycleState::Stopped => {
                debug!("core already stopped");
                return Ok(());
            }
            LifecycleState::NotStarted | LifecycleState::Starting | LifecycleState::Stopping => {
                return Err(CoreError::SequencingViolation(format!(
                    "shutdown invoked in state {:?}",
                    self.state
                )));
            }
        }
        self.state = LifecycleState::Stopping;
        info!("stopping core services");

        // Step 1: drain the outbound connection pool
        if let Err(e) = self.transport.close_all().await {
            warn!(error = %e, "failed to close outbound transport pool");
        }

        // Step 2: controller drops its compute sessions
        if let Err(e) = Controller::instance().stop().await {
            warn!(error = %e, "controller stop failed");
        }

        // Step 3: modules release their processes and ports
        ModuleRegistry::instance().unload_all().await;

        // Step 4: leak report, diagnostic only
        let allocator = PortAllocator::instance();
        for protocol in [Protocol::Tcp, Protocol::Udp] {
            let leaked = allocator.leaked(protocol);
            if !leaked.is_empty() {
                let ports: Vec<String> = leaked
                    .iter()
                    .map(|a| format!("{} ({})", a.port, a.owner))
                    .collect();
                warn!(
                    %protocol,
                    count = leaked.len(),
                    ports = %ports.join(", "),
                    "ports still allocated at shutdown"
                );
            }
        }

        if let Some(task) = self.keepalive_task.take() {
            task.abort();
        }

        self.state = LifecycleState::Stopped;
        info!("core services stopped");
        Ok(())
    }
}
