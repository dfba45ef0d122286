//! Settings Module
//!
//! Forwarder configuration: storage location, envelope, fan-out limits and
//! the outbound transport.

pub mod preferences;

pub use preferences::{ForwarderSettings, TransportSettings};
