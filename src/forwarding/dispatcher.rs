//! Dispatcher
//!
//! Fans an outbound message out to every destination of the matched rule.
//! Each destination is attempted independently; a failure is recorded and
//! never stops the remaining attempts. Outcomes come back in input order.

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use super::rule_types::{DeliveryOutcome, DeliveryReport};
use crate::transport::Transport;

/// Default envelope label placed above the forwarded body
pub const DEFAULT_ENVELOPE_LABEL: &str = "Forwarded SMS";

const DEFAULT_MAX_CONCURRENT_DELIVERIES: usize = 4;
const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatcher tuning
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub envelope_label: String,
    pub max_concurrent_deliveries: usize,
    pub delivery_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            envelope_label: DEFAULT_ENVELOPE_LABEL.to_string(),
            max_concurrent_deliveries: DEFAULT_MAX_CONCURRENT_DELIVERIES,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }
}

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, config: DispatcherConfig) -> Self {
        Self { transport, config }
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self::new(transport, DispatcherConfig::default())
    }

    /// Text actually handed to the transport for each destination
    pub fn format_envelope(&self, sender: &str, body: &str) -> String {
        format!("{}\nFrom: {}\n\n{}", self.config.envelope_label, sender, body)
    }

    /// Attempt delivery to every destination and collect all outcomes.
    ///
    /// Returns only after every attempt has finished or timed out.
    pub async fn send_all(&self, sender: &str, body: &str, destinations: &[String]) -> Vec<DeliveryReport> {
        let envelope = self.format_envelope(sender, body);
        let limit = self.config.max_concurrent_deliveries.max(1);

        debug!(
            "Dispatching via {} to {} destination(s), concurrency {}",
            self.transport.name(),
            destinations.len(),
            limit
        );

        stream::iter(destinations.iter())
            .map(|destination| self.deliver(destination, &envelope))
            .buffered(limit)
            .collect()
            .await
    }

    async fn deliver(&self, destination: &str, envelope: &str) -> DeliveryReport {
        let attempt = self.transport.send(destination, envelope);

        let outcome = match tokio::time::timeout(self.config.delivery_timeout, attempt).await {
            Ok(Ok(())) => {
                info!("Delivered to {}", destination);
                DeliveryOutcome::Delivered
            }
            Ok(Err(e)) => {
                warn!("Delivery to {} failed: {}", destination, e);
                DeliveryOutcome::Failed { reason: e.to_string() }
            }
            Err(_) => {
                warn!(
                    "Delivery to {} timed out after {:?}",
                    destination, self.config.delivery_timeout
                );
                DeliveryOutcome::Failed {
                    reason: format!("timed out after {:?}", self.config.delivery_timeout),
                }
            }
        };

        DeliveryReport {
            destination: destination.to_string(),
            outcome,
        }
    }
}
