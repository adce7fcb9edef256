// Reply channel seen by the console

use crate::comm::ProgressPayload;
use crate::executor::ProgressSnapshot;
use async_trait::async_trait;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

/// Where interim output for the current request goes
///
/// The final reply is the console's return value; a sink only carries what
/// is sent before it.
#[async_trait(?Send)]
pub trait ReplySink {
    /// A progress snapshot from a running terminal command
    async fn progress(&self, snapshot: &ProgressSnapshot);

    /// A free-form interim message, e.g. from a snippet's `reply()`
    async fn send(&self, text: &str);
}

/// Sink that forwards into the transport's progress channel
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressPayload>,
    started: Instant,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<ProgressPayload>) -> Self {
        Self {
            tx,
            started: Instant::now(),
        }
    }

    fn push(&self, elapsed_ms: u64, content: String) {
        if self.tx.send(ProgressPayload { elapsed_ms, content }).is_err() {
            debug!("progress receiver dropped");
        }
    }
}

#[async_trait(?Send)]
impl ReplySink for ChannelSink {
    async fn progress(&self, snapshot: &ProgressSnapshot) {
        self.push(
            snapshot.elapsed_ms,
            format!(
                "[running {:.1}s]\n{}",
                snapshot.elapsed_ms as f64 / 1000.0,
                snapshot.partial_output
            ),
        );
    }

    async fn send(&self, text: &str) {
        self.push(self.started.elapsed().as_millis() as u64, text.to_string());
    }
}

/// Sink that drops everything
pub struct NullSink;

#[async_trait(?Send)]
impl ReplySink for NullSink {
    async fn progress(&self, _snapshot: &ProgressSnapshot) {}

    async fn send(&self, _text: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_channel_sink_forwards_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);

        sink.progress(&ProgressSnapshot {
            request_id: Uuid::new_v4(),
            elapsed_ms: 3000,
            partial_output: "Receiving objects: 12%".to_string(),
        })
        .await;
        sink.send("halfway").await;
        drop(sink);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.elapsed_ms, 3000);
        assert_eq!(first.content, "[running 3.0s]\nReceiving objects: 12%");
        assert_eq!(rx.recv().await.unwrap().content, "halfway");
        assert!(rx.recv().await.is_none());
    }
}
