/**
 * lifecycle module
 * Deterministic startup/shutdown sequencing for the whole core
 */

mod keepalive;
mod sequencer;

pub use keepalive::KeepAlive;
pub use sequencer::{BackgroundJob, LifecycleSequencer};
