//! Module registry
//!
//! Holds one factory per emulator technology and hands out the lazily
//! created singleton for each. Load fans out the start hooks as
//! independent tasks, so one slow or broken emulator backend cannot
//! stall the others; the drain runs in reverse registration order.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::errors::{CoreError, Result};
use crate::module::{EmulatorModule, ModuleHandle};
use crate::port::PortAllocator;

static REGISTRY_INSTANCE: Lazy<Mutex<Option<Arc<ModuleRegistry>>>> =
    Lazy::new(|| Mutex::new(None));

type ModuleFactory = Box<dyn Fn() -> Arc<dyn EmulatorModule> + Send + Sync>;

struct RegistryInner {
    /// (kind, factory) in registration order; order is deterministic
    /// within one process run so test expectations stay stable
    factories: Vec<(String, ModuleFactory)>,
    handles: HashMap<String, Arc<ModuleHandle>>,
}

/// Registry of emulator module singletons
pub struct ModuleRegistry {
    inner: Mutex<RegistryInner>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                factories: Vec::new(),
                handles: HashMap::new(),
            }),
        }
    }

    /// Get the process-wide singleton registry.
    pub fn instance() -> Arc<ModuleRegistry> {
        let mut guard = REGISTRY_INSTANCE
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        guard
            .get_or_insert_with(|| Arc::new(ModuleRegistry::new()))
            .clone()
    }

    /// Drop the singleton registry. Reserved for test harnesses.
    pub fn reset() {
        let mut guard = REGISTRY_INSTANCE
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    /// Register a module factory under `kind`.
    ///
    /// Creation is deferred until the first `module` call; the factory
    /// must not start any background work.
    pub fn register<F>(&self, kind: &str, factory: F) -> Result<()>
    where
        F: Fn() -> Arc<dyn EmulatorModule> + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.factories.iter().any(|(k, _)| k == kind) {
            return Err(CoreError::InvalidRequest(format!(
                "module kind already registered: {}",
                kind
            )));
        }
        inner.factories.push((kind.to_string(), Box::new(factory)));
        debug!(module = kind, "module kind registered");
        Ok(())
    }

    /// Registered module kinds, in registration order.
    pub fn kinds(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.factories.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Get the singleton handle for `kind`, creating it on first call.
    pub fn module(&self, kind: &str) -> Result<Arc<ModuleHandle>> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(handle) = inner.handles.get(kind) {
            return Ok(Arc::clone(handle));
        }

        let factory = inner
            .factories
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, f)| f)
            .ok_or_else(|| CoreError::ModuleError(format!("unknown module kind: {}", kind)))?;

        let handle = ModuleHandle::new(factory());
        inner.handles.insert(kind.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Load every registered module.
    ///
    /// Each module gets the shared allocator injected and its start
    /// hook run as an independent task capped by `start_timeout`. A
    /// failing or hanging module is logged and never prevents the
    /// others from loading; the call returns once every module has
    /// been attempted.
    pub async fn load_all(&self, allocator: Arc<PortAllocator>, start_timeout: Duration) {
        let kinds = self.kinds();
        let mut tasks = Vec::with_capacity(kinds.len());

        for kind in kinds {
            let handle = match self.module(&kind) {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(module = %kind, error = %e, "failed to create module, skipping");
                    continue;
                }
            };
            let allocator = Arc::clone(&allocator);
            let task = tokio::spawn(async move {
                tokio::time::timeout(start_timeout, handle.start(allocator)).await
            });
            tasks.push((kind, task));
        }

        for (kind, task) in tasks {
            match task.await {
                Ok(Ok(Ok(()))) => info!(module = %kind, "module loaded"),
                Ok(Ok(Err(e))) => {
                    warn!(module = %kind, error = %e, "module failed to start, continuing without it")
                }
                Ok(Err(_)) => {
                    warn!(module = %kind, "module start timed out, continuing without it")
                }
                Err(e) => warn!(module = %kind, error = %e, "module start task failed"),
            }
        }
    }

    /// Unload every created module, in reverse registration order.
    ///
    /// Unload hooks release the processes and ports a module still
    /// holds; failures are logged and never stop the drain.
    pub async fn unload_all(&self) {
        let mut handles = Vec::new();
        {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            for (kind, _) in inner.factories.iter().rev() {
                if let Some(handle) = inner.handles.get(kind) {
                    handles.push((kind.clone(), Arc::clone(handle)));
                }
            }
        }

        for (kind, handle) in handles {
            match handle.unload().await {
                Ok(()) => debug!(module = %kind, "module unloaded"),
                Err(e) => warn!(module = %kind, error = %e, "module unload failed, continuing"),
            }
        }
    }
}
