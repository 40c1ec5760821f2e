use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};

/// One HTTP exchange with the provider. Transport-level failures (DNS,
/// timeout) surface as `GatewayError::Network`; application-level error
/// bodies come back as a reply with a non-2xx status.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
    /// `Location` header, needed by the checkout-authorize proxy which
    /// must read the redirect target itself.
    pub location: Option<String>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Thin seam over the HTTP client so the connector's retry discipline can
/// be exercised against mock transports.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_json(&self, url: &str, body: &JsonValue) -> GatewayResult<HttpReply>;

    async fn get(&self, url: &str) -> GatewayResult<HttpReply>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a client with the fixed provider timeout and redirects
    /// disabled.
    pub fn new(timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|e| GatewayError::Network {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    async fn into_reply(response: reqwest::Response) -> GatewayResult<HttpReply> {
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = response.text().await.unwrap_or_default();

        Ok(HttpReply {
            status,
            body,
            location,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(&self, url: &str, body: &JsonValue) -> GatewayResult<HttpReply> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Network {
                message: format!("provider request failed: {}", e),
            })?;

        Self::into_reply(response).await
    }

    async fn get(&self, url: &str) -> GatewayResult<HttpReply> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::Network {
                message: format!("provider request failed: {}", e),
            })?;

        Self::into_reply(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_classification_is_2xx() {
        let reply = |status| HttpReply {
            status,
            body: String::new(),
            location: None,
        };
        assert!(reply(200).is_success());
        assert!(reply(204).is_success());
        assert!(!reply(199).is_success());
        assert!(!reply(300).is_success());
        assert!(!reply(400).is_success());
    }
}
