//! Shared HTTP client construction for provider adapters

use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("ear-daemon/", env!("CARGO_PKG_VERSION"));

/// Failure of a single external provider call.
///
/// Never pipeline-fatal: the chains log it and move to the next provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Encode error: {0}")]
    Encode(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Parse(e.to_string())
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

/// reqwest client with the daemon user agent and a request timeout.
///
/// Errors from requests sent through it report timeouts as
/// `ProviderError::Timeout` carrying the configured limit.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl ProviderClient {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    pub fn get<U: reqwest::IntoUrl>(&self, url: U) -> reqwest::RequestBuilder {
        self.client.get(url)
    }

    pub fn post<U: reqwest::IntoUrl>(&self, url: U) -> reqwest::RequestBuilder {
        self.client.post(url)
    }

    pub async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        request.send().await.map_err(|e| self.error(e))
    }

    /// Classify an error from a request or body read on this client
    pub fn error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else {
            e.into()
        }
    }
}

/// Turn a non-2xx response into `ProviderError::Api`
pub async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Api(status.as_u16(), body))
}
