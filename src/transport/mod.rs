//! Transport Module
//!
//! The outbound delivery boundary. The forwarding core only relies on
//! "attempt to send text T to address A"; concrete transports live here.

pub mod console;
pub mod http_gateway;
pub mod memory;

pub use console::ConsoleTransport;
pub use http_gateway::HttpGatewayTransport;
pub use memory::MemoryTransport;

use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by a transport for a single send attempt
#[derive(Error, Debug)]
pub enum TransportError {
    /// The transport or remote gateway refused the message
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The destination or gateway could not be reached
    #[error("Unreachable: {0}")]
    Unreachable(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Capability to deliver one text to one destination address
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, destination: &str, text: &str) -> Result<(), TransportError>;

    /// Name used in logs
    fn name(&self) -> &str;
}
