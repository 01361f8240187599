//! Thin HTTP client wrapper.
//!
//! Wraps reqwest with a fixed user agent and configurable timeout so the
//! rest of the crate never builds raw clients.

use crate::config::NetworkConfig;
use crate::{HangarError, Result};
use reqwest::{Client, Response};
use std::time::Duration;

/// HTTP client used by the GitHub source host.
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a new HTTP client with a custom default timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Hangar/0.3")
            .build()
            .map_err(|e| HangarError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: Some(e.to_string()),
            })?;

        Ok(Self { client })
    }

    /// Get a reference to the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Perform a GET request.
    pub async fn get(&self, url: &str) -> Result<Response> {
        Ok(self.client.get(url).send().await?)
    }

    /// Perform a GET request with additional headers.
    pub async fn get_with_headers(&self, url: &str, headers: &[(String, String)]) -> Result<Response> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        Ok(request.send().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = HttpClient::new();
        assert!(client.is_ok());
    }

    #[test]
    fn test_client_with_timeout() {
        let client = HttpClient::with_timeout(Duration::from_secs(5));
        assert!(client.is_ok());
    }
}
