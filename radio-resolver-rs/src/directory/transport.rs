use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("response body is not JSON: {0}")]
    Body(String),
}

/// Outbound HTTP as the directory client needs it.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` and parse the body as JSON. Non-2xx statuses are errors.
    async fn get_json(&self, url: &Url, timeout: Duration) -> Result<Value, TransportError>;

    /// HEAD `url`, following redirects, and report the final status.
    async fn head(&self, url: &Url, timeout: Duration) -> Result<u16, TransportError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, allow_insecure_transports: bool) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent.to_string())
            .danger_accept_invalid_certs(allow_insecure_transports)
            .build()?;
        Ok(Self { client })
    }
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if let Some(status) = error.status() {
        TransportError::Status(status.as_u16())
    } else {
        TransportError::Network(error.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, url: &Url, timeout: Duration) -> Result<Value, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;
        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }
        response.json::<Value>().await.map_err(|error| {
            if error.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Body(error.to_string())
            }
        })
    }

    async fn head(&self, url: &Url, timeout: Duration) -> Result<u16, TransportError> {
        let response = self
            .client
            .head(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;
        Ok(response.status().as_u16())
    }
}
