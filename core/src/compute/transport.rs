//! Outbound transport to remote computes
//!
//! The controller only needs two things from the transport: a
//! reachability/session check per compute, and a pool drain at
//! shutdown. The wire protocol behind those calls is out of core
//! scope, so both sit behind `ComputeTransport`.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::compute::ComputeDescriptor;
use crate::errors::{CoreError, Result};

/// Outbound transport collaborator interface
#[async_trait]
pub trait ComputeTransport: Send + Sync {
    /// Establish session state for one compute.
    ///
    /// Errors map to `BackendUnreachable`; the caller records the
    /// compute as degraded and proceeds.
    async fn connect(&self, descriptor: &ComputeDescriptor) -> Result<()>;

    /// Release all pooled outbound connections.
    ///
    /// Must be safe to call even if no connection was ever opened.
    async fn close_all(&self) -> Result<()>;
}

/// HTTP transport built on a lazily-created pooled reqwest client
pub struct HttpTransport {
    client: Mutex<Option<reqwest::Client>>,
    connect_timeout: Duration,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            client: Mutex::new(None),
            connect_timeout,
        }
    }

    fn client(&self) -> Result<reqwest::Client> {
        let mut guard = self.client.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(client) => Ok(client.clone()),
            None => {
                let client = reqwest::Client::builder()
                    .connect_timeout(self.connect_timeout)
                    .build()
                    .map_err(|e| {
                        CoreError::BackendUnreachable(format!("failed to build http client: {}", e))
                    })?;
                *guard = Some(client.clone());
                Ok(client)
            }
        }
    }
}

#[async_trait]
impl ComputeTransport for HttpTransport {
    async fn connect(&self, descriptor: &ComputeDescriptor) -> Result<()> {
        let client = self.client()?;
        let url = format!("{}/v3/version", descriptor.url());

        let mut request = client.get(&url).timeout(self.connect_timeout);
        if let Some(user) = &descriptor.user {
            request = request.basic_auth(user, descriptor.password.as_deref());
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(compute = %descriptor.display_name(), %url, "compute reachable");
                Ok(())
            }
            Ok(response) => Err(CoreError::BackendUnreachable(format!(
                "{} returned HTTP {}",
                url,
                response.status()
            ))),
            Err(e) => Err(CoreError::BackendUnreachable(format!("{}: {}", url, e))),
        }
    }

    async fn close_all(&self) -> Result<()> {
        let dropped = {
            let mut guard = self.client.lock().unwrap_or_else(|e| e.into_inner());
            guard.take().is_some()
        };
        if dropped {
            debug!("outbound connection pool closed");
        }
        Ok(())
    }
}
