//! Stale-context flusher (§4.2): a background sweeper task, the same
//! periodic-sweep-plus-shutdown-drain shape as the session registry's own
//! retention sweep.

use crate::memory::ConversationMemory;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub fn spawn(
    memory: Arc<ConversationMemory>,
    idle: Duration,
    sweep_interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    memory.sweep(idle);
                    debug!("stale-context flusher swept conversation memory");
                }
                _ = shutdown.cancelled() => {
                    debug!("stale-context flusher shutting down");
                    return;
                }
            }
        }
    })
}
