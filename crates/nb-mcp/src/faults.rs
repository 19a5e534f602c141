//! Fault channel
//!
//! Faults that no single `invoke_tool` caller can own (a stream that breaks
//! after its headers went out, a transport that loses its peer) are
//! published here instead of being raised. Every fault is logged; anyone
//! interested can subscribe.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::error;

use crate::error::McpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultSource {
    Transport,
    Stream,
    Handler,
}

impl std::fmt::Display for FaultSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultSource::Transport => write!(f, "transport"),
            FaultSource::Stream => write!(f, "stream"),
            FaultSource::Handler => write!(f, "handler"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Fault {
    pub source: FaultSource,
    /// Tool or endpoint the fault happened under, if known
    pub context: Option<String>,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Fault {
    pub fn new(source: FaultSource, message: impl Into<String>) -> Self {
        Self {
            source,
            context: None,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn from_error(source: FaultSource, err: &McpError) -> Self {
        Self::new(source, err.to_string())
    }
}

#[derive(Clone)]
pub struct FaultReporter {
    tx: broadcast::Sender<Fault>,
}

impl FaultReporter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn report(&self, fault: Fault) {
        error!(
            source = %fault.source,
            context = fault.context.as_deref().unwrap_or("-"),
            message = %fault.message,
            "Fault reported"
        );
        // No subscribers is fine; the log line above is the record
        let _ = self.tx.send(fault);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Fault> {
        self.tx.subscribe()
    }
}

impl Default for FaultReporter {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_fault() {
        let reporter = FaultReporter::new(4);
        let mut rx = reporter.subscribe();

        reporter.report(
            Fault::from_error(FaultSource::Stream, &McpError::ChannelClosed)
                .with_context("export_session"),
        );

        let fault = rx.recv().await.unwrap();
        assert_eq!(fault.source, FaultSource::Stream);
        assert_eq!(fault.context.as_deref(), Some("export_session"));
        assert_eq!(fault.message, "Response channel closed");
    }

    #[test]
    fn test_report_without_subscribers() {
        let reporter = FaultReporter::default();
        reporter.report(Fault::new(FaultSource::Transport, "stdout closed"));
    }
}
