//! Forwarder Settings
//!
//! Handles persistent forwarder settings loaded from a JSON file.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ForwarderError;
use crate::forwarding::dispatcher::{DispatcherConfig, DEFAULT_ENVELOPE_LABEL};
use crate::forwarding::storage::DEFAULT_RULES_KEY;
use crate::transport::http_gateway::HttpGatewayConfig;
use crate::transport::{ConsoleTransport, HttpGatewayTransport, Transport};

/// Which transport delivers forwarded messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportSettings {
    /// Print deliveries to stderr
    Console,
    /// POST deliveries to an SMS gateway
    HttpGateway(HttpGatewayConfig),
}

impl Default for TransportSettings {
    fn default() -> Self {
        TransportSettings::Console
    }
}

/// Forwarder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderSettings {
    /// Directory holding the persisted rule blob
    pub data_dir: PathBuf,
    pub rules_key: String,
    pub envelope_label: String,
    pub max_concurrent_deliveries: usize,
    pub delivery_timeout_secs: u64,
    pub transport: TransportSettings,
}

impl ForwarderSettings {
    pub fn new() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            rules_key: DEFAULT_RULES_KEY.to_string(),
            envelope_label: DEFAULT_ENVELOPE_LABEL.to_string(),
            max_concurrent_deliveries: 4,
            delivery_timeout_secs: 30,
            transport: TransportSettings::Console,
        }
    }

    /// Load settings from `path`, falling back to defaults when it is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::new());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;

        settings.validate()?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Update settings from a partial JSON document.
    ///
    /// The update is applied to a copy; `self` is left untouched when a field
    /// has the wrong type or the result fails validation.
    pub fn update_from_json(&mut self, json: Value) -> Result<()> {
        let mut next = self.clone();

        if let Some(data_dir) = string_field(&json, "data_dir")? {
            next.data_dir = PathBuf::from(data_dir);
        }

        if let Some(rules_key) = string_field(&json, "rules_key")? {
            next.rules_key = rules_key.to_string();
        }

        if let Some(label) = string_field(&json, "envelope_label")? {
            next.envelope_label = label.to_string();
        }

        if let Some(limit) = u64_field(&json, "max_concurrent_deliveries")? {
            next.max_concurrent_deliveries = usize::try_from(limit).map_err(|_| {
                ForwarderError::Settings(format!("max_concurrent_deliveries {} is out of range", limit))
            })?;
        }

        if let Some(timeout) = u64_field(&json, "delivery_timeout_secs")? {
            next.delivery_timeout_secs = timeout;
        }

        if let Some(transport) = json.get("transport") {
            next.transport = serde_json::from_value(transport.clone())
                .context("Invalid transport settings")?;
        }

        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Write settings to `path` as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).context("Failed to encode settings")?;
        std::fs::write(path, raw)
            .with_context(|| format!("Failed to write settings file {}", path.display()))?;

        info!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ForwarderError> {
        if self.rules_key.trim().is_empty() {
            return Err(ForwarderError::Settings("rules_key cannot be empty".to_string()));
        }

        if self.rules_key.contains(['/', '\\']) {
            return Err(ForwarderError::Settings(
                "rules_key cannot contain path separators".to_string(),
            ));
        }

        if self.envelope_label.trim().is_empty() {
            return Err(ForwarderError::Settings("envelope_label cannot be empty".to_string()));
        }

        if self.max_concurrent_deliveries == 0 {
            return Err(ForwarderError::Settings(
                "max_concurrent_deliveries must be greater than 0".to_string(),
            ));
        }

        if self.delivery_timeout_secs == 0 {
            return Err(ForwarderError::Settings(
                "delivery_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if let TransportSettings::HttpGateway(gateway) = &self.transport {
            if gateway.url.trim().is_empty() {
                return Err(ForwarderError::Settings("http_gateway url cannot be empty".to_string()));
            }
            if gateway.timeout_secs == 0 {
                return Err(ForwarderError::Settings(
                    "http_gateway timeout_secs must be greater than 0".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            envelope_label: self.envelope_label.clone(),
            max_concurrent_deliveries: self.max_concurrent_deliveries,
            delivery_timeout: Duration::from_secs(self.delivery_timeout_secs),
        }
    }

    /// Build the configured transport
    pub fn build_transport(&self) -> Result<Arc<dyn Transport>> {
        let transport: Arc<dyn Transport> = match &self.transport {
            TransportSettings::Console => Arc::new(ConsoleTransport::new()),
            TransportSettings::HttpGateway(config) => Arc::new(
                HttpGatewayTransport::new(config.clone())
                    .context("Failed to create HTTP gateway client")?,
            ),
        };

        Ok(transport)
    }

    /// Export settings to JSON
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

impl Default for ForwarderSettings {
    fn default() -> Self {
        Self::new()
    }
}

fn string_field<'a>(json: &'a Value, name: &str) -> Result<Option<&'a str>, ForwarderError> {
    match json.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| ForwarderError::Settings(format!("{} must be a string", name))),
    }
}

fn u64_field(json: &Value, name: &str) -> Result<Option<u64>, ForwarderError> {
    match json.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| ForwarderError::Settings(format!("{} must be a non-negative integer", name))),
    }
}
