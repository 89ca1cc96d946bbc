//! # Labmesh Core - Network Lab Orchestration Runtime
//!
//! Labmesh is a network emulation platform: users build topologies of
//! routers, switches and hosts, and Labmesh runs them on one or more
//! compute backends. This crate is the orchestration core that every
//! entry point (daemon, CLI, tests) boots through.
//!
//! ## Core Principle
//!
//! **One sequencer, one ordering**: every process that embeds this core
//! starts and stops through [`LifecycleSequencer`], so the port
//! allocator, the emulator modules and the controller always come up
//! in an order where nothing uses an unready dependency, and go down
//! without leaking ports or processes.
//!
//! ## Key Features
//!
//! - Owner-tagged TCP/UDP port allocation with leak detection
//! - Pluggable emulator modules behind a lazy singleton registry
//! - Compute session tracking with degraded-backend tolerance
//! - Deterministic startup/shutdown sequencing with detached
//!   background jobs and a platform keep-alive tick
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        LifecycleSequencer           │
//! │   startup / shutdown ordering       │
//! └─────────────────────────────────────┘
//!    │            │              │
//!    ▼            ▼              ▼
//! ┌────────┐ ┌──────────┐ ┌──────────────┐
//! │Control-│ │ Module   │ │ Port         │
//! │ler     │ │ Registry │ │ Allocator    │
//! └────────┘ └──────────┘ └──────────────┘
//!    │            │
//!    ▼            ▼
//!  computes    emulator backends
//! ```

pub mod errors;
pub mod config;
pub mod port;
pub mod compute;
pub mod controller;
pub mod module;
pub mod lifecycle;
pub mod images;

pub use errors::{CoreError, Result};
pub use config::CoreConfig;
pub use port::{PortAllocation, PortAllocator, PortRange, Protocol};
pub use compute::{ComputeDescriptor, ComputeStore, ComputeTransport, HttpTransport, JsonComputeStore};
pub use controller::{ComputeSession, ComputeStatus, Controller, LifecycleState};
pub use module::{EmulatorModule, ModuleHandle, ModuleRegistry};
pub use lifecycle::{BackgroundJob, KeepAlive, LifecycleSequencer};
pub use images::precompute_image_checksums;

/// Version of the Labmesh core
pub const VERSION: &str = "0.1.0";
