/**
 * allocator.rs
 * Host-wide dynamic port allocation
 *
 * Every port handed out is tagged with the owner (project or node id)
 * that requested it, so:
 * - a held port can never be double-assigned while held
 * - a destroyed project releases all of its ports in one call
 * - allocations still held at shutdown are attributable in the log
 *
 * Allocation strategy:
 * - One half-open range per protocol (TCP consoles, UDP tunnels)
 * - Preferred port honored when free, otherwise ascending linear scan
 * - Lowest free port wins, so allocation is reproducible for tests
 */

use chrono::Utc;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::config::CoreConfig;
use crate::errors::{CoreError, Result};

static ALLOCATOR_INSTANCE: Lazy<Mutex<Option<Arc<PortAllocator>>>> =
    Lazy::new(|| Mutex::new(None));

/// Transport protocol a port is bound on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// Half-open port interval [start, end) for one protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Check if port is within this range (upper bound exclusive)
    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port < self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// One held port, tagged with the owner responsible for releasing it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortAllocation {
    pub protocol: Protocol,
    pub port: u16,
    pub owner: String,
    pub host: String,
    pub acquired_at: String,
}

/// Port Allocator - hands out unique ports from the configured ranges
pub struct PortAllocator {
    host: String,
    tcp_range: PortRange,
    udp_range: PortRange,
    reserved: HashSet<u16>,
    held: Mutex<HashMap<(Protocol, u16), PortAllocation>>,
}

impl PortAllocator {
    /// Create an allocator from the core configuration.
    pub fn new(config: &CoreConfig) -> Self {
        Self::with_ranges(
            &config.bind_host,
            config.tcp_ports,
            config.udp_ports,
            &config.reserved_ports,
        )
    }

    /// Create an allocator with explicit ranges (used by tests and
    /// embedders that bypass the config file).
    pub fn with_ranges(host: &str, tcp: PortRange, udp: PortRange, reserved: &[u16]) -> Self {
        Self {
            host: host.to_string(),
            tcp_range: tcp,
            udp_range: udp,
            reserved: reserved.iter().copied().collect(),
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Get the process-wide singleton, creating a default-configured
    /// allocator on first access.
    pub fn instance() -> Arc<PortAllocator> {
        let mut guard = ALLOCATOR_INSTANCE
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        guard
            .get_or_insert_with(|| Arc::new(PortAllocator::new(&CoreConfig::default())))
            .clone()
    }

    /// Replace the singleton with a freshly configured allocator.
    ///
    /// Called once by the lifecycle sequencer before modules load, so
    /// every module observes the same configured instance.
    pub fn initialize(config: &CoreConfig) -> Arc<PortAllocator> {
        let allocator = Arc::new(PortAllocator::new(config));
        let mut guard = ALLOCATOR_INSTANCE
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *guard = Some(allocator.clone());
        allocator
    }

    /// Drop the singleton. Reserved for test harnesses.
    pub fn reset() {
        let mut guard = ALLOCATOR_INSTANCE
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn range(&self, protocol: Protocol) -> PortRange {
        match protocol {
            Protocol::Tcp => self.tcp_range,
            Protocol::Udp => self.udp_range,
        }
    }

    /// Acquire a free port for `owner`.
    ///
    /// A `preferred` port is handed out directly when it is inside the
    /// configured range, not reserved, and not already held; a preferred
    /// port outside the range is an `InvalidRequest` and allocates
    /// nothing. Otherwise the range is scanned in ascending order and
    /// the lowest free port wins.
    ///
    /// # Errors
    ///
    /// `PortExhausted` when no port in the range is free.
    pub fn acquire(&self, protocol: Protocol, owner: &str, preferred: Option<u16>) -> Result<u16> {
        let range = self.range(protocol);
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(port) = preferred {
            if !range.contains(port) {
                return Err(CoreError::InvalidRequest(format!(
                    "preferred {} port {} outside configured range {}",
                    protocol, port, range
                )));
            }
            if !self.reserved.contains(&port) && !held.contains_key(&(protocol, port)) {
                held.insert((protocol, port), self.allocation(protocol, port, owner));
                debug!(%protocol, port, owner, "acquired preferred port");
                return Ok(port);
            }
            // Preferred port busy, fall back to the scan
        }

        for port in range.start..range.end {
            if self.reserved.contains(&port) || held.contains_key(&(protocol, port)) {
                continue;
            }
            held.insert((protocol, port), self.allocation(protocol, port, owner));
            debug!(%protocol, port, owner, "acquired port");
            return Ok(port);
        }

        Err(CoreError::PortExhausted(format!(
            "no free {} port in range {} for owner {}",
            protocol, range, owner
        )))
    }

    /// Release a port previously acquired by `owner`.
    ///
    /// Idempotent: releasing a port that is not allocated, or that is
    /// held by a different owner, is logged as a caller-side bug and
    /// otherwise ignored.
    pub fn release(&self, protocol: Protocol, port: u16, owner: &str) -> bool {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());

        match held.get(&(protocol, port)) {
            Some(allocation) if allocation.owner == owner => {
                held.remove(&(protocol, port));
                debug!(%protocol, port, owner, "released port");
                true
            }
            Some(allocation) => {
                warn!(
                    %protocol,
                    port,
                    held_by = %allocation.owner,
                    requested_by = owner,
                    "refusing to release port held by another owner"
                );
                false
            }
            None => {
                warn!(%protocol, port, owner, "release of a port that is not allocated");
                false
            }
        }
    }

    /// Release every allocation held by `owner` across both protocols.
    ///
    /// Used when a project or node is destroyed, so partial cleanup
    /// cannot accumulate leaks. Returns the number of ports released.
    pub fn release_all(&self, owner: &str) -> usize {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        let before = held.len();
        held.retain(|_, allocation| allocation.owner != owner);
        let released = before - held.len();
        if released > 0 {
            debug!(owner, released, "released all ports for owner");
        }
        released
    }

    /// Snapshot of every allocation currently held for `protocol`,
    /// sorted by port.
    ///
    /// Queried at shutdown for diagnostic reporting; a non-empty result
    /// is surfaced as a warning, not an error, since in-flight node
    /// processes may legitimately still be running.
    pub fn leaked(&self, protocol: Protocol) -> Vec<PortAllocation> {
        let held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        let mut leaked: Vec<PortAllocation> = held
            .values()
            .filter(|allocation| allocation.protocol == protocol)
            .cloned()
            .collect();
        leaked.sort_by_key(|allocation| allocation.port);
        leaked
    }

    /// Total number of held allocations across both protocols.
    pub fn held_count(&self) -> usize {
        self.held.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn allocation(&self, protocol: Protocol, port: u16, owner: &str) -> PortAllocation {
        PortAllocation {
            protocol,
            port,
            owner: owner.to_string(),
            host: self.host.clone(),
            acquired_at: Utc::now().to_rfc3339(),
        }
    }
}
