//! Core configuration
//!
//! Loaded once at daemon startup from a YAML file; every field has a
//! production default so a missing or partial file still yields a
//! runnable configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{CoreError, Result};
use crate::port::PortRange;

/// Configuration for the orchestration core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    /// Host that emulated node ports are bound on
    pub bind_host: String,

    /// TCP (console) port range, half-open
    pub tcp_ports: PortRange,

    /// UDP (tunnel) port range, half-open
    pub udp_ports: PortRange,

    /// Ports never handed out, regardless of range membership
    pub reserved_ports: Vec<u16>,

    /// JSON file holding the known compute descriptors
    pub computes_file: PathBuf,

    /// Directory scanned by the image checksum warmup job
    pub images_dir: PathBuf,

    /// Cap on a single compute reachability check
    pub connect_timeout_secs: u64,

    /// Cap on a single module start hook
    pub module_start_timeout_secs: u64,

    /// Interval of the platform keep-alive tick
    pub keepalive_interval_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            tcp_ports: PortRange::new(5000, 10000),
            udp_ports: PortRange::new(10000, 20000),
            reserved_ports: Vec::new(),
            computes_file: PathBuf::from("computes.json"),
            images_dir: PathBuf::from("images"),
            connect_timeout_secs: 10,
            module_start_timeout_secs: 60,
            keepalive_interval_ms: 500,
        }
    }
}

impl CoreConfig {
    /// Load configuration from a YAML file.
    ///
    /// Fields absent from the file keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CoreError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;

        let config: CoreConfig = serde_yaml::from_str(&content).map_err(|e| {
            CoreError::ConfigError(format!("invalid config {}: {}", path.display(), e))
        })?;

        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn module_start_timeout(&self) -> Duration {
        Duration::from_secs(self.module_start_timeout_secs)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }
}
