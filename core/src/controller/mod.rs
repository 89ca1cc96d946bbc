/**
 * controller module
 * Top-level singleton owning the set of compute backends and their
 * connection lifecycle
 */

mod controller;

pub use controller::{ComputeSession, ComputeStatus, Controller, LifecycleState};
