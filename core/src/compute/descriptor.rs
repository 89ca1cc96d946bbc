//! Compute descriptor
//!
//! Identity and connection parameters for one remote compute backend.
//! Loaded once at startup from the compute store and owned by the
//! Controller for the lifetime of the process.

use serde::{Deserialize, Serialize};

/// Identity and connection parameters for one remote compute backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeDescriptor {
    /// Unique compute id
    pub compute_id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,

    /// Connection scheme ("http" or "https")
    pub protocol: String,

    pub host: String,

    pub port: u16,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ComputeDescriptor {
    /// Base URL of the compute's API endpoint
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }

    /// Name to show in logs: explicit name when set, id otherwise
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.compute_id)
    }
}
