//! Message Router
//!
//! Routes one inbound message through load → match → rewrite → dispatch and
//! reports the terminal outcome.

use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

use super::dispatcher::Dispatcher;
use super::matcher;
use super::rewriter;
use super::rule_types::{ForwardReport, InboundMessage, RouteOutcome};
use super::storage::RuleStore;

/// Running counters over every message the router has handled
#[derive(Debug, Clone, Default)]
struct RouterStatistics {
    received: u64,
    ignored: u64,
    forwarded: u64,
    deliveries_succeeded: u64,
    deliveries_failed: u64,
    last_routed_at: Option<DateTime<Utc>>,
}

/// Routes inbound messages using the rules held by a [`RuleStore`]
pub struct MessageRouter {
    store: Arc<RuleStore>,
    dispatcher: Dispatcher,
    statistics: Mutex<RouterStatistics>,
}

impl MessageRouter {
    pub fn new(store: Arc<RuleStore>, dispatcher: Dispatcher) -> Self {
        Self {
            store,
            dispatcher,
            statistics: Mutex::new(RouterStatistics::default()),
        }
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    /// Process one inbound message to a terminal state.
    ///
    /// "No rule matched" is the `Ignored` outcome, not an error; delivery
    /// failures are reported per destination inside `Completed`.
    pub async fn route(&self, message: InboundMessage) -> RouteOutcome {
        debug!(
            "Received message from {} ({} chars)",
            message.sender,
            message.body.len()
        );
        self.statistics.lock().received += 1;

        let rules = self.store.load().await;

        debug!("Matching against {} rule(s)", rules.len());
        let Some(rule) = matcher::find(&message.sender, &message.body, &rules) else {
            debug!("No forwarding rule matched message from {}", message.sender);
            let mut statistics = self.statistics.lock();
            statistics.ignored += 1;
            statistics.last_routed_at = Some(Utc::now());
            return RouteOutcome::Ignored;
        };

        debug!("Matched rule {}, rewriting", rule.id);
        let outbound_body = rewriter::apply(&message.body, &rule.substitution_rule);

        debug!("Dispatching to {} destination(s)", rule.forwarding_numbers.len());
        let deliveries = self
            .dispatcher
            .send_all(&message.sender, &outbound_body, &rule.forwarding_numbers)
            .await;

        let report = ForwardReport {
            rule_id: rule.id,
            outbound_body,
            deliveries,
            completed_at: Utc::now(),
        };

        info!(
            "Forwarded message from {} via rule {}: {} delivered, {} failed",
            message.sender,
            rule.id,
            report.delivered_count(),
            report.failed_count()
        );

        {
            let mut statistics = self.statistics.lock();
            statistics.forwarded += 1;
            statistics.deliveries_succeeded += report.delivered_count() as u64;
            statistics.deliveries_failed += report.failed_count() as u64;
            statistics.last_routed_at = Some(report.completed_at);
        }

        RouteOutcome::Completed(report)
    }

    /// Get router statistics
    pub async fn get_statistics(&self) -> Value {
        let statistics = self.statistics.lock().clone();

        serde_json::json!({
            "messages_received": statistics.received,
            "messages_ignored": statistics.ignored,
            "messages_forwarded": statistics.forwarded,
            "deliveries_succeeded": statistics.deliveries_succeeded,
            "deliveries_failed": statistics.deliveries_failed,
            "last_routed_at": statistics.last_routed_at,
            "rule_stats": self.store.get_statistics().await
        })
    }
}
