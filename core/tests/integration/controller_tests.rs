//! Controller integration tests
//!
//! Exercise the controller against a scripted transport and the JSON
//! compute store: mixed reachable/unreachable backends, session
//! snapshots, and state transitions.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use labmesh_core::{
    ComputeDescriptor, ComputeStatus, ComputeStore, ComputeTransport, Controller, CoreError,
    JsonComputeStore, LifecycleState, Result,
};

/// Transport whose outcome is scripted per compute id.
struct ScriptedTransport {
    unreachable: HashSet<String>,
}

impl ScriptedTransport {
    fn new(unreachable: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            unreachable: unreachable.iter().map(|s| s.to_string()).collect(),
        })
    }
}

#[async_trait]
impl ComputeTransport for ScriptedTransport {
    async fn connect(&self, descriptor: &ComputeDescriptor) -> Result<()> {
        if self.unreachable.contains(&descriptor.compute_id) {
            return Err(CoreError::BackendUnreachable(format!(
                "{}: connection refused",
                descriptor.url()
            )));
        }
        Ok(())
    }

    async fn close_all(&self) -> Result<()> {
        Ok(())
    }
}

fn descriptor(id: &str, port: u16) -> ComputeDescriptor {
    ComputeDescriptor {
        compute_id: id.to_string(),
        name: None,
        protocol: "http".to_string(),
        host: "127.0.0.1".to_string(),
        port,
        user: None,
        password: None,
    }
}

#[tokio::test]
async fn unreachable_compute_leaves_controller_running() {
    let controller = Controller::new();
    let transport = ScriptedTransport::new(&["rack2"]);

    controller
        .start(
            vec![descriptor("rack1", 3080), descriptor("rack2", 3081)],
            transport,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(controller.state(), LifecycleState::Running);
    assert_eq!(controller.compute_count().await, 2);

    let rack1 = controller.compute("rack1").await.unwrap();
    assert_eq!(rack1.status, ComputeStatus::Connected);
    assert!(rack1.last_error.is_none());

    let rack2 = controller.compute("rack2").await.unwrap();
    assert_eq!(rack2.status, ComputeStatus::Degraded);
    assert!(rack2.last_error.as_deref().unwrap().contains("refused"));
}

#[tokio::test]
async fn session_snapshot_is_sorted_by_compute_id() {
    let controller = Controller::new();
    let transport = ScriptedTransport::new(&[]);

    controller
        .start(
            vec![
                descriptor("rack3", 3082),
                descriptor("rack1", 3080),
                descriptor("rack2", 3081),
            ],
            transport,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    let ids: Vec<String> = controller
        .computes()
        .await
        .into_iter()
        .map(|s| s.descriptor.compute_id)
        .collect();
    assert_eq!(ids, vec!["rack1", "rack2", "rack3"]);
}

#[tokio::test]
async fn unknown_compute_lookup_is_an_error() {
    let controller = Controller::new();
    let transport = ScriptedTransport::new(&[]);

    controller
        .start(vec![descriptor("rack1", 3080)], transport, Duration::from_secs(1))
        .await
        .unwrap();

    let err = controller.compute("nope").await.unwrap_err();
    assert!(matches!(err, CoreError::ComputeNotFound(_)));
}

#[tokio::test]
async fn stop_clears_sessions_and_is_idempotent() {
    let controller = Controller::new();
    let transport = ScriptedTransport::new(&[]);

    controller
        .start(vec![descriptor("rack1", 3080)], transport, Duration::from_secs(1))
        .await
        .unwrap();

    controller.stop().await.unwrap();
    assert_eq!(controller.state(), LifecycleState::Stopped);
    assert_eq!(controller.compute_count().await, 0);

    // Second stop is a no-op
    controller.stop().await.unwrap();
    assert_eq!(controller.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn computes_loaded_from_store_reach_the_controller() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("computes.json");
    let json = serde_json::json!([
        {
            "computeId": "rack1",
            "protocol": "http",
            "host": "192.168.1.10",
            "port": 3080
        },
        {
            "computeId": "rack2",
            "name": "Lab rack 2",
            "protocol": "https",
            "host": "192.168.1.11",
            "port": 3081,
            "user": "admin"
        }
    ]);
    std::fs::write(&path, serde_json::to_vec_pretty(&json).unwrap()).unwrap();

    let store = JsonComputeStore::new(&path);
    store.connect().await.unwrap();
    let descriptors = store.load_computes().await.unwrap();
    assert_eq!(descriptors.len(), 2);

    let controller = Controller::new();
    controller
        .start(descriptors, ScriptedTransport::new(&[]), Duration::from_secs(1))
        .await
        .unwrap();

    let rack2 = controller.compute("rack2").await.unwrap();
    assert_eq!(rack2.descriptor.display_name(), "Lab rack 2");
    assert_eq!(rack2.descriptor.url(), "https://192.168.1.11:3081");
}

#[tokio::test]
async fn empty_compute_list_still_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("computes.json");

    // connect() seeds a fresh store with an empty list
    let store = JsonComputeStore::new(&path);
    store.connect().await.unwrap();
    let descriptors = store.load_computes().await.unwrap();
    assert!(descriptors.is_empty());

    let controller = Controller::new();
    controller
        .start(descriptors, ScriptedTransport::new(&[]), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(controller.state(), LifecycleState::Running);
    assert_eq!(controller.compute_count().await, 0);
}

#[tokio::test]
async fn start_twice_is_a_sequencing_violation() {
    let controller = Controller::new();

    controller
        .start(vec![], ScriptedTransport::new(&[]), Duration::from_secs(1))
        .await
        .unwrap();

    let err = controller
        .start(vec![], ScriptedTransport::new(&[]), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SequencingViolation(_)));
}
