//! HTTP client bound to a running host.

use crate::error::{FuncTestError, Result};
use reqwest::{Client, Method, RequestBuilder};
use std::time::Duration;
use url::Url;

/// A reqwest client whose request paths are resolved against the host's base
/// address.
#[derive(Debug, Clone)]
pub struct HostClient {
    client: Client,
    base_url: Url,
}

impl HostClient {
    /// Create a client for `base_url` with a per-request `timeout`.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FuncTestError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get a reference to the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Resolve `path` against the base address.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|e| FuncTestError::Config {
            message: format!("Invalid request path '{}': {}", path, e),
        })
    }

    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        Ok(self.client.request(method, self.url(path)?))
    }

    pub fn get(&self, path: &str) -> Result<RequestBuilder> {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> Result<RequestBuilder> {
        self.request(Method::POST, path)
    }
}
