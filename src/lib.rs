//! SMS Forwarder - Rule-Based Inbound Message Forwarding
//!
//! Matches each inbound short message against an ordered, persisted list of
//! forwarding rules (first match wins), optionally rewrites the body with the
//! rule's `before -> after` substitution, and fans the result out to every
//! destination of the rule with per-destination outcomes.

pub mod error;
pub mod forwarding;
pub mod settings;
pub mod transport;

pub use error::{ForwarderError, ForwarderResult};
pub use forwarding::{
    DeliveryOutcome, DeliveryReport, Dispatcher, DispatcherConfig, ForwardReport, ForwardingRule,
    InboundMessage, MessageRouter, RouteOutcome, RuleDraft, RuleId, RuleStore,
};
pub use settings::ForwarderSettings;
pub use transport::{Transport, TransportError};
