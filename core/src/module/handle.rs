//! Module singletons and their lifecycle bookkeeping
//!
//! An emulator technology (a "module") plugs in by implementing
//! `EmulatorModule`. The registry wraps each instance in a
//! `ModuleHandle` that enforces the lifecycle contract: started at most
//! once during boot, unloaded at most once during drain, and wired to
//! the shared port allocator before it is asked to do any work.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::errors::Result;
use crate::port::PortAllocator;

/// One emulator technology, e.g. a virtualization or container runtime.
///
/// Implementations spawn and reap the OS processes representing
/// emulated nodes; that logic is backend-specific and lives entirely
/// behind this trait.
#[async_trait]
pub trait EmulatorModule: Send + Sync {
    /// Stable module name used for registry lookup and logging.
    fn name(&self) -> &str;

    /// Start hook, invoked once during boot with the shared allocator.
    ///
    /// A failure leaves this module degraded (e.g. its emulator is not
    /// installed on this host) and never affects other modules.
    async fn start(&self, allocator: Arc<PortAllocator>) -> Result<()>;

    /// Unload hook, invoked once during drain.
    ///
    /// Must release every process and port the module still holds.
    async fn unload(&self) -> Result<()>;
}

/// Lifecycle wrapper around one module singleton
pub struct ModuleHandle {
    module: Arc<dyn EmulatorModule>,
    started: AtomicBool,
    allocator: Mutex<Option<Arc<PortAllocator>>>,
}

impl ModuleHandle {
    pub(crate) fn new(module: Arc<dyn EmulatorModule>) -> Arc<Self> {
        Arc::new(Self {
            module,
            started: AtomicBool::new(false),
            allocator: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        self.module.name()
    }

    /// Whether the start hook has run successfully.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// The allocator injected at load time, if the module was loaded.
    pub fn port_allocator(&self) -> Option<Arc<PortAllocator>> {
        self.allocator
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Inject the shared allocator and run the start hook.
    ///
    /// Exactly-once: a second call on a started handle is a no-op. The
    /// started flag is only set after the hook succeeds, so a failed or
    /// cancelled start leaves the handle un-started and the later drain
    /// skips its unload hook.
    pub async fn start(&self, allocator: Arc<PortAllocator>) -> Result<()> {
        if self.started.load(Ordering::SeqCst) {
            debug!(module = self.name(), "module already started");
            return Ok(());
        }

        {
            let mut guard = self.allocator.lock().unwrap_or_else(|e| e.into_inner());
            *guard = Some(Arc::clone(&allocator));
        }

        self.module.start(allocator).await?;
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Run the unload hook if the module was started.
    pub async fn unload(&self) -> Result<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            debug!(module = self.name(), "module not started, skipping unload");
            return Ok(());
        }
        self.module.unload().await
    }
}
