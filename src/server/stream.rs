//! Response Streamer
//!
//! Serializes the orchestrator's incremental output into the wire
//! protocol: a channel of text chunks consumed by the HTTP layer and
//! flushed to the client as a chunked body. A failure that happens
//! before the first chunk is reported as a `Fatal` event so the
//! handler can still answer with a proper 500; after that the stream
//! is simply closed.

use tokio::sync::mpsc;

#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Chunk(String),
    Fatal(String),
}

/// Write side of one response stream.
pub struct ResponseStreamer {
    tx: mpsc::Sender<StreamEvent>,
}

impl ResponseStreamer {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (ResponseStreamer { tx }, rx)
    }

    /// Forward one text chunk. Returns `false` once the client has
    /// disconnected, which is the orchestrator's signal to abandon the
    /// request.
    pub async fn write(&self, text: &str) -> bool {
        if text.is_empty() {
            return !self.tx.is_closed();
        }
        self.tx
            .send(StreamEvent::Chunk(text.to_string()))
            .await
            .is_ok()
    }

    /// Report an unrecoverable failure.
    pub async fn fail(&self, message: impl Into<String>) {
        let _ = self.tx.send(StreamEvent::Fatal(message.into())).await;
    }
}
