//! Wire framing (§6): each `WireEvent` becomes one SSE `data:` line. Also
//! owns the "client disconnect aborts the session" wiring — the stream's
//! `Drop` is the only reliable disconnect signal axum exposes.

use futures::Stream;
use searchagent_core::{Session, WireEvent};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

fn wire_event_to_sse(event: WireEvent) -> axum::response::sse::Event {
    axum::response::sse::Event::default()
        .event(event.kind)
        .json_data(&event)
        .unwrap_or_else(|_| axum::response::sse::Event::default().event("error").data("{}"))
}

/// Wraps a session's event receiver; dropping it (client disconnect, or the
/// stream running to completion) cancels the session's abort token so every
/// in-flight component stops promptly (§4.9 Cancellation).
pub struct SessionEventStream {
    session: Arc<Session>,
    rx: mpsc::Receiver<WireEvent>,
}

impl SessionEventStream {
    pub fn new(session: Arc<Session>, rx: mpsc::Receiver<WireEvent>) -> Self {
        Self { session, rx }
    }
}

impl Stream for SessionEventStream {
    type Item = Result<axum::response::sse::Event, std::convert::Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(Ok(wire_event_to_sse(event)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SessionEventStream {
    fn drop(&mut self) {
        self.session.abort();
    }
}

/// Periodically emits a `heartbeat` wire event on the session so idle
/// connections see traffic at least every `interval` (§6). Stops once the
/// session goes terminal.
pub fn spawn_heartbeat(session: Arc<Session>, interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if session.is_terminal() || session.is_aborted() {
                return;
            }
            if session.emit_heartbeat().is_err() {
                return;
            }
        }
    });
}
