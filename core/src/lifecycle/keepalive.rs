//! Platform keep-alive strategy
//!
//! On Windows, signal delivery cannot interrupt an idle event loop
//! wait, so a blocked process would never observe a termination
//! request. The fix is a recurring no-op tick that wakes the loop.
//! Platforms with native signal delivery need no task at all.
//!
//! Expressed as a strategy selected once at startup instead of cfg
//! branches inside the sequencer.

use std::time::Duration;
use tokio::task::JoinHandle;

/// How the process stays responsive to termination requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAlive {
    /// Recurring no-op wake-up at the given interval
    Tick(Duration),
    /// Signal delivery interrupts waits natively; no task needed
    NativeSignals,
}

impl KeepAlive {
    /// Select the strategy for the host platform.
    pub fn for_platform(interval: Duration) -> Self {
        if cfg!(windows) {
            KeepAlive::Tick(interval)
        } else {
            KeepAlive::NativeSignals
        }
    }

    /// Spawn the keep-alive task, if the strategy needs one.
    ///
    /// The returned handle is aborted during shutdown.
    pub fn spawn(self) -> Option<JoinHandle<()>> {
        match self {
            KeepAlive::Tick(interval) => Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                }
            })),
            KeepAlive::NativeSignals => None,
        }
    }
}
