//! Compute store collaborator
//!
//! The persistence layer is deliberately thin: the core needs a working
//! connection and the authoritative compute list at startup, nothing
//! more. `JsonComputeStore` keeps the descriptors in a single JSON file;
//! swapping in a database-backed store only requires implementing
//! `ComputeStore`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::compute::ComputeDescriptor;
use crate::errors::{CoreError, Result};

/// Persistence collaborator interface.
///
/// `connect` failing is the one fatal startup error in the whole
/// system: nothing downstream can proceed without the compute list.
#[async_trait]
pub trait ComputeStore: Send + Sync {
    /// Establish the persistence connection.
    async fn connect(&self) -> Result<()>;

    /// Load every persisted compute descriptor.
    async fn load_computes(&self) -> Result<Vec<ComputeDescriptor>>;
}

/// JSON-file-backed compute store
pub struct JsonComputeStore {
    path: PathBuf,
}

impl JsonComputeStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ComputeStore for JsonComputeStore {
    async fn connect(&self) -> Result<()> {
        if !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        CoreError::StoreError(format!(
                            "failed to create {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
            tokio::fs::write(&self.path, "[]").await.map_err(|e| {
                CoreError::StoreError(format!("failed to create {}: {}", self.path.display(), e))
            })?;
            debug!(path = %self.path.display(), "created empty compute store");
        }
        Ok(())
    }

    async fn load_computes(&self) -> Result<Vec<ComputeDescriptor>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            CoreError::StoreError(format!("failed to read {}: {}", self.path.display(), e))
        })?;

        let computes: Vec<ComputeDescriptor> = serde_json::from_str(&content).map_err(|e| {
            CoreError::StoreError(format!("invalid compute store {}: {}", self.path.display(), e))
        })?;

        debug!(count = computes.len(), "loaded compute descriptors");
        Ok(computes)
    }
}
