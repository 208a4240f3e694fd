//! Consumer handle for a streaming chat turn.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use ragchat_chat::StreamEvent;
use tokio::sync::mpsc;

/// Receiving end of one streaming turn.
///
/// Yields events in emission order and ends after the terminal event. Dropping the
/// handle (or calling [`ChatStream::close`]) cancels the turn: the producing task stops
/// consuming the LLM and releases the upstream connection.
pub struct ChatStream {
    turn_id: String,
    rx: mpsc::Receiver<StreamEvent>,
}

impl ChatStream {
    pub(crate) fn new(turn_id: String, rx: mpsc::Receiver<StreamEvent>) -> Self {
        Self { turn_id, rx }
    }

    pub fn turn_id(&self) -> &str {
        &self.turn_id
    }

    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Cancel the turn. No further events are delivered.
    pub fn close(self) {
        drop(self);
    }

    /// Drain the remaining events.
    pub async fn collect_events(mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}

impl Stream for ChatStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        self.rx.poll_recv(cx)
    }
}
