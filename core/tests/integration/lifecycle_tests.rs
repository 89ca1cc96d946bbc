//! Lifecycle sequencing integration tests
//!
//! Drive the full startup/shutdown ordering through the process-wide
//! singletons. These tests share the singletons, so each one takes the
//! serialization lock and resets global state before it runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use labmesh_core::{
    BackgroundJob, ComputeDescriptor, ComputeTransport, Controller, CoreConfig, CoreError,
    EmulatorModule, JsonComputeStore, LifecycleSequencer, LifecycleState, ModuleRegistry,
    PortAllocator, PortRange, Protocol, Result,
};

// Tests in this file mutate process-wide singletons and must not
// interleave, even under the default multi-threaded test runner.
static TEST_LOCK: Mutex<()> = Mutex::new(());

fn serialized() -> std::sync::MutexGuard<'static, ()> {
    let guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    Controller::reset();
    ModuleRegistry::reset();
    PortAllocator::reset();
    guard
}

fn test_config(dir: &std::path::Path) -> CoreConfig {
    let mut config = CoreConfig::default();
    config.computes_file = dir.join("computes.json");
    config.images_dir = dir.join("images");
    config.tcp_ports = PortRange::new(15000, 15100);
    config.udp_ports = PortRange::new(25000, 25100);
    config
}

struct NullTransport;

#[async_trait]
impl ComputeTransport for NullTransport {
    async fn connect(&self, _descriptor: &ComputeDescriptor) -> Result<()> {
        Ok(())
    }
    async fn close_all(&self) -> Result<()> {
        Ok(())
    }
}

fn sequencer(config: &CoreConfig) -> LifecycleSequencer {
    LifecycleSequencer::new(
        config.clone(),
        Arc::new(JsonComputeStore::new(&config.computes_file)),
        Arc::new(NullTransport),
    )
}

/// Module that grabs a console port at start and frees it at unload.
struct TidyModule;

#[async_trait]
impl EmulatorModule for TidyModule {
    fn name(&self) -> &str {
        "tidy"
    }
    async fn start(&self, allocator: Arc<PortAllocator>) -> Result<()> {
        allocator.acquire(Protocol::Tcp, "tidy", None)?;
        Ok(())
    }
    async fn unload(&self) -> Result<()> {
        PortAllocator::instance().release_all("tidy");
        Ok(())
    }
}

/// Module that grabs ports and never gives them back.
struct LeakyModule;

#[async_trait]
impl EmulatorModule for LeakyModule {
    fn name(&self) -> &str {
        "leaky"
    }
    async fn start(&self, allocator: Arc<PortAllocator>) -> Result<()> {
        allocator.acquire(Protocol::Tcp, "leaky", None)?;
        allocator.acquire(Protocol::Udp, "leaky", None)?;
        Ok(())
    }
    async fn unload(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn full_boot_and_drain_leaves_no_leaks() {
    let _guard = serialized();
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    ModuleRegistry::instance()
        .register("tidy", || Arc::new(TidyModule))
        .unwrap();

    let mut seq = sequencer(&config);
    seq.startup().await.unwrap();
    assert_eq!(seq.state(), LifecycleState::Running);
    assert_eq!(Controller::instance().state(), LifecycleState::Running);
    assert_eq!(PortAllocator::instance().held_count(), 1);

    seq.shutdown().await.unwrap();
    assert_eq!(seq.state(), LifecycleState::Stopped);
    assert_eq!(Controller::instance().state(), LifecycleState::Stopped);

    let allocator = PortAllocator::instance();
    assert!(allocator.leaked(Protocol::Tcp).is_empty());
    assert!(allocator.leaked(Protocol::Udp).is_empty());
}

#[tokio::test]
async fn leaked_ports_are_reported_not_fatal() {
    let _guard = serialized();
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    ModuleRegistry::instance()
        .register("leaky", || Arc::new(LeakyModule))
        .unwrap();

    let mut seq = sequencer(&config);
    seq.startup().await.unwrap();

    // Drain succeeds despite the leak; the ports stay visible afterwards
    seq.shutdown().await.unwrap();
    assert_eq!(seq.state(), LifecycleState::Stopped);

    let allocator = PortAllocator::instance();
    assert_eq!(allocator.leaked(Protocol::Tcp).len(), 1);
    assert_eq!(allocator.leaked(Protocol::Udp).len(), 1);
    assert_eq!(allocator.leaked(Protocol::Tcp)[0].owner, "leaky");
}

#[tokio::test]
async fn startup_twice_is_a_sequencing_violation() {
    let _guard = serialized();
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let mut seq = sequencer(&config);
    seq.startup().await.unwrap();

    let err = seq.startup().await.unwrap_err();
    assert!(matches!(err, CoreError::SequencingViolation(_)));
    // The running system is untouched by the refused call
    assert_eq!(seq.state(), LifecycleState::Running);

    seq.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_before_startup_is_a_sequencing_violation() {
    let _guard = serialized();
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let mut seq = sequencer(&config);
    let err = seq.shutdown().await.unwrap_err();
    assert!(matches!(err, CoreError::SequencingViolation(_)));
    assert_eq!(seq.state(), LifecycleState::NotStarted);
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let _guard = serialized();
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let mut seq = sequencer(&config);
    seq.startup().await.unwrap();
    seq.shutdown().await.unwrap();
    seq.shutdown().await.unwrap();
    assert_eq!(seq.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn store_failure_aborts_startup() {
    let _guard = serialized();
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());

    // A regular file where the store expects a parent directory
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    config.computes_file = blocker.join("computes.json");

    let mut seq = sequencer(&config);
    let err = seq.startup().await.unwrap_err();
    assert!(matches!(err, CoreError::StoreError(_)));
    assert_eq!(seq.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn failing_background_job_does_not_affect_startup() {
    let _guard = serialized();
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let ran = Arc::new(AtomicBool::new(false));
    let ran_clone = Arc::clone(&ran);

    let mut seq = sequencer(&config);
    seq.add_background_job(BackgroundJob::new("doomed", async move {
        ran_clone.store(true, Ordering::SeqCst);
        Err(CoreError::ModuleError("warmup failed".to_string()))
    }));

    seq.startup().await.unwrap();
    assert_eq!(seq.state(), LifecycleState::Running);

    // The job was detached; give it a beat to run
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(ran.load(Ordering::SeqCst));

    seq.shutdown().await.unwrap();
}

#[tokio::test]
async fn computes_from_store_are_connected_at_boot() {
    let _guard = serialized();
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let json = serde_json::json!([
        { "computeId": "local", "protocol": "http", "host": "127.0.0.1", "port": 3080 }
    ]);
    std::fs::write(&config.computes_file, serde_json::to_vec(&json).unwrap()).unwrap();

    let mut seq = sequencer(&config);
    seq.startup().await.unwrap();

    assert_eq!(Controller::instance().compute_count().await, 1);
    let session = Controller::instance().compute("local").await.unwrap();
    assert_eq!(session.descriptor.url(), "http://127.0.0.1:3080");

    seq.shutdown().await.unwrap();
}
