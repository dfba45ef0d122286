//! Forwarding Module
//!
//! Rule-based forwarding of inbound short messages: the persisted rule list,
//! first-match-wins selection, body rewriting and per-destination fan-out.

pub mod dispatcher;
pub mod matcher;
pub mod rewriter;
pub mod router;
pub mod rule_types;
pub mod storage;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use router::MessageRouter;
pub use rule_types::{
    DeliveryOutcome, DeliveryReport, ForwardReport, ForwardingRule, InboundMessage, RouteOutcome,
    RuleDraft, RuleId,
};
pub use storage::{BlobStore, FileBlobStore, InMemoryBlobStore, RuleStore};
