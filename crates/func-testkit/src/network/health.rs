//! Readiness polling against the host's health endpoint.

use crate::cancel::CancellationToken;
use crate::config::NetworkConfig;
use crate::error::{FuncTestError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// One readiness probe. `Ok` means the host answered with success.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, url: &Url) -> Result<()>;
}

/// Plain `GET` over reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestProbe {
    client: Client,
}

impl ReqwestProbe {
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::HEALTH_CHECK_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FuncTestError::Network {
                message: format!("Failed to create health check client: {}", e),
                source: Some(e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for ReqwestProbe {
    async fn probe(&self, url: &Url) -> Result<()> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FuncTestError::Network {
                message: format!("GET {} failed: {}", url, e),
                source: Some(e),
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(FuncTestError::Network {
                message: format!("GET {} returned {}", url, status),
                source: None,
            })
        }
    }
}

/// Probe `url` until it succeeds, `max_attempts` probes fail, or `cancel` fires.
///
/// Failures are transient: each is followed by a fixed `interval` wait. At
/// least one probe is always sent.
/// Cancellation resolves to `Ok(())`, since it means another readiness signal
/// already won.
pub async fn wait_until_healthy(
    probe: &dyn HealthProbe,
    url: &Url,
    max_attempts: u32,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Ok(());
        }

        match probe.probe(url).await {
            Ok(()) => {
                debug!("Health check at {} succeeded on attempt {}", url, attempt);
                return Ok(());
            }
            Err(e) => {
                debug!(
                    "Health check attempt {}/{} at {} failed: {}",
                    attempt, max_attempts, url, e
                );
            }
        }

        if attempt < max_attempts && !cancel.sleep(interval).await {
            return Ok(());
        }
    }

    Err(FuncTestError::HealthCheckExhausted {
        url: url.to_string(),
        attempts: max_attempts,
    })
}
