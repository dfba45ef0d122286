//! HTTP SMS gateway transport.
//!
//! Posts each delivery as `{"to": ..., "text": ...}` JSON to a gateway URL.

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Transport, TransportError};

/// Gateway endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpGatewayConfig {
    pub url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl HttpGatewayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Request payload accepted by the gateway
#[derive(Debug, Serialize)]
struct SendSmsRequest<'a> {
    to: &'a str,
    text: &'a str,
}

pub struct HttpGatewayTransport {
    config: HttpGatewayConfig,
    client: Client,
}

impl HttpGatewayTransport {
    pub fn new(config: HttpGatewayConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl Transport for HttpGatewayTransport {
    async fn send(&self, destination: &str, text: &str) -> Result<(), TransportError> {
        debug!("POST {} for {}", self.config.url, destination);

        let mut request = self
            .client
            .post(&self.config.url)
            .json(&SendSmsRequest { to: destination, text });

        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                TransportError::Unreachable(e.to_string())
            } else {
                TransportError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected(format!("HTTP {}: {}", status, body.trim())));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "http_gateway"
    }
}
