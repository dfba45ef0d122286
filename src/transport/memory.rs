//! In-memory transport that records every send, with scripted failures.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use super::{Transport, TransportError};

/// A delivered text as seen by the memory transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentText {
    pub destination: String,
    pub text: String,
}

/// Transport that keeps sent texts in memory instead of delivering them
pub struct MemoryTransport {
    sent: Mutex<Vec<SentText>>,
    attempts: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, String>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            attempts: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
        }
    }

    /// Make every send to `destination` fail with `reason`
    pub fn fail_destination(&self, destination: &str, reason: &str) {
        self.failures.lock().insert(destination.to_string(), reason.to_string());
    }

    /// Delay every send to `destination` before it completes
    pub fn delay_destination(&self, destination: &str, delay: Duration) {
        self.delays.lock().insert(destination.to_string(), delay);
    }

    /// Texts that were accepted, in completion order
    pub fn sent(&self) -> Vec<SentText> {
        self.sent.lock().clone()
    }

    /// Every destination a send was attempted for, in attempt order
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, destination: &str, text: &str) -> Result<(), TransportError> {
        self.attempts.lock().push(destination.to_string());

        let delay = self.delays.lock().get(destination).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().get(destination).cloned();
        if let Some(reason) = failure {
            return Err(TransportError::Rejected(reason));
        }

        self.sent.lock().push(SentText {
            destination: destination.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
