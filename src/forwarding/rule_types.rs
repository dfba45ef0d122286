//! Forwarding Rule Definitions
//!
//! Defines the rule record persisted by the store, the drafts used by the
//! management interface, and the values produced while routing a message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ForwarderError, ForwarderResult};

/// Stable identifier assigned to a rule when it is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(Uuid);

impl RuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RuleId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// A persisted filter + action record.
///
/// Field names on the wire are `filterNumber`, `filterWord`,
/// `substitutionRule` and `forwardingNumbers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardingRule {
    pub id: RuleId,
    /// Substring of the sender address; empty matches any sender
    pub filter_number: String,
    /// Substring of the message body; empty matches any body
    pub filter_word: String,
    /// `"<before> -> <after>"`, anything else leaves the body untouched
    pub substitution_rule: String,
    pub forwarding_numbers: Vec<String>,
}

impl ForwardingRule {
    /// Build a rule from a validated draft, assigning a fresh id
    pub fn create(draft: RuleDraft) -> ForwarderResult<Self> {
        Self::with_id(RuleId::new(), draft)
    }

    /// Build a rule carrying an existing id, used when replacing a record
    pub fn with_id(id: RuleId, draft: RuleDraft) -> ForwarderResult<Self> {
        let draft = draft.validated()?;

        Ok(Self {
            id,
            filter_number: draft.filter_number,
            filter_word: draft.filter_word,
            substitution_rule: draft.substitution_rule,
            forwarding_numbers: draft.forwarding_numbers,
        })
    }

    /// Whether this rule carries the given (filterNumber, filterWord) pair
    pub fn has_filters(&self, filter_number: &str, filter_word: &str) -> bool {
        self.filter_number == filter_number && self.filter_word == filter_word
    }

    /// Short human readable summary for logs and CLI output
    pub fn describe(&self) -> String {
        let number = if self.filter_number.is_empty() { "*" } else { &self.filter_number };
        let word = if self.filter_word.is_empty() { "*" } else { &self.filter_word };

        format!(
            "[{}] number={} word={} -> {}",
            self.id,
            number,
            word,
            self.forwarding_numbers.join(", ")
        )
    }
}

/// User supplied rule fields, validated before anything is persisted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDraft {
    #[serde(default)]
    pub filter_number: String,
    #[serde(default)]
    pub filter_word: String,
    #[serde(default)]
    pub substitution_rule: String,
    #[serde(default)]
    pub forwarding_numbers: Vec<String>,
}

impl RuleDraft {
    pub fn new(
        filter_number: impl Into<String>,
        filter_word: impl Into<String>,
        substitution_rule: impl Into<String>,
        forwarding_numbers: Vec<String>,
    ) -> Self {
        Self {
            filter_number: filter_number.into(),
            filter_word: filter_word.into(),
            substitution_rule: substitution_rule.into(),
            forwarding_numbers,
        }
    }

    /// Check the rule invariants and normalise destinations.
    ///
    /// Filters are kept verbatim since the matcher treats any non-empty
    /// filter as a literal substring.
    pub fn validated(mut self) -> ForwarderResult<Self> {
        if self.filter_number.trim().is_empty() && self.filter_word.trim().is_empty() {
            return Err(ForwarderError::Validation(
                "either a sender number filter or a message word filter is required".to_string(),
            ));
        }

        if self.forwarding_numbers.is_empty() {
            return Err(ForwarderError::Validation(
                "at least one forwarding number is required".to_string(),
            ));
        }

        if self.forwarding_numbers.iter().any(|number| number.trim().is_empty()) {
            return Err(ForwarderError::Validation(
                "forwarding numbers cannot be blank".to_string(),
            ));
        }

        self.forwarding_numbers = self
            .forwarding_numbers
            .into_iter()
            .map(|number| number.trim().to_string())
            .collect();

        Ok(self)
    }
}

impl From<ForwardingRule> for RuleDraft {
    fn from(rule: ForwardingRule) -> Self {
        Self {
            filter_number: rule.filter_number,
            filter_word: rule.filter_word,
            substitution_rule: rule.substitution_rule,
            forwarding_numbers: rule.forwarding_numbers,
        }
    }
}

/// A short message delivered to the router by the inbound trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender: String,
    pub body: String,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
            received_at: Utc::now(),
        }
    }
}

/// Result of a single delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Outcome recorded for one destination of a fan-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub destination: String,
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
}

/// Everything produced when a message was matched and dispatched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardReport {
    pub rule_id: RuleId,
    pub outbound_body: String,
    pub deliveries: Vec<DeliveryReport>,
    pub completed_at: DateTime<Utc>,
}

impl ForwardReport {
    pub fn delivered_count(&self) -> usize {
        self.deliveries.iter().filter(|report| report.outcome.is_delivered()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.deliveries.len() - self.delivered_count()
    }
}

/// Terminal state of routing one inbound message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RouteOutcome {
    /// No rule matched; nothing was sent
    Ignored,
    /// A rule matched and every destination was attempted
    Completed(ForwardReport),
}

impl RouteOutcome {
    pub fn report(&self) -> Option<&ForwardReport> {
        match self {
            RouteOutcome::Completed(report) => Some(report),
            RouteOutcome::Ignored => None,
        }
    }
}
