//! Console transport: prints each delivery to stderr. Used for dry runs.

use async_trait::async_trait;
use log::info;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{Transport, TransportError};

pub struct ConsoleTransport {
    // Keeps concurrent deliveries from interleaving their lines
    stderr: Mutex<tokio::io::Stderr>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self {
            stderr: Mutex::new(tokio::io::stderr()),
        }
    }

    fn render(destination: &str, text: &str) -> String {
        let mut rendered = format!("==> {}\n", destination);
        for line in text.lines() {
            rendered.push_str("    ");
            rendered.push_str(line);
            rendered.push('\n');
        }
        rendered
    }
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send(&self, destination: &str, text: &str) -> Result<(), TransportError> {
        info!("Console delivery to {} ({} chars)", destination, text.len());

        let rendered = Self::render(destination, text);
        let mut stderr = self.stderr.lock().await;
        stderr
            .write_all(rendered.as_bytes())
            .await
            .map_err(|e| TransportError::Unreachable(format!("stderr: {}", e)))?;
        stderr
            .flush()
            .await
            .map_err(|e| TransportError::Unreachable(format!("stderr: {}", e)))?;

        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_indents_every_line() {
        let rendered = ConsoleTransport::render("+100", "Forwarded SMS\nFrom: +1\n\nhi");
        assert_eq!(rendered, "==> +100\n    Forwarded SMS\n    From: +1\n    \n    hi\n");
    }

    #[tokio::test]
    async fn test_default_settings_deliver_through_console() {
        let transport = crate::ForwarderSettings::default().build_transport().unwrap();
        assert_eq!(transport.name(), "console");
        transport.send("+100", "Forwarded SMS\nFrom: +1\n\nhi").await.unwrap();
    }
}
