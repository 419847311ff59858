//! Session & Block streaming protocol (§4.1, §3, §6).
//!
//! `Session` is the single serialization point for every event a request
//! produces: it assigns monotonically increasing event ids, holds the
//! materialized value of every block (so a reconnecting client can be caught
//! up), and fans events out to subscribers. All of that state lives behind a
//! single `std::sync::Mutex` that is held only for the duration of a
//! non-suspending mutation — emitting never itself suspends (§5).
//!
//! Wire format:
//!
//! ```text
//! { "kind": "block"|"updateBlock"|"researchProgress"|"end"|"error"|"heartbeat",
//!   "sessionId": "...", "eventId": N, "payload": { ... } }
//! ```

use crate::error::{Error, Result};
use crate::types::{BlockId, FinalAggregate, SessionId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The kind of a block; stable for the block's lifetime (§3 invariant).
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    Widget,
    ResearchProgress,
}

impl BlockKind {
    fn as_str(self) -> &'static str {
        match self {
            BlockKind::Text => "text",
            BlockKind::Widget => "widget",
            BlockKind::ResearchProgress => "research_progress",
        }
    }
}

/// Wire envelope written to subscribers (§6).
#[derive(Clone, Debug, Serialize)]
pub struct WireEvent {
    pub kind: &'static str,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "eventId")]
    pub event_id: u64,
    pub payload: serde_json::Value,
}

/// A JSON-Patch append for a text block's materialized `{"text": [...]}`
/// value. Keeping the op vocabulary to `add`/`replace` per §9.
pub fn append_text_patch(delta: &str) -> Vec<serde_json::Value> {
    vec![serde_json::json!({ "op": "add", "path": "/text/-", "value": delta })]
}

/// Apply a list of RFC-6902 patch operations (as plain JSON) to a materialized
/// block value.
fn apply_patch(value: &mut serde_json::Value, patch_ops: &[serde_json::Value]) -> Result<()> {
    let patch: json_patch::Patch = serde_json::from_value(serde_json::Value::Array(patch_ops.to_vec()))
        .map_err(|e| Error::InternalInvariantViolation(format!("malformed patch: {e}")))?;
    json_patch::patch(value, &patch)
        .map_err(|e| Error::InternalInvariantViolation(format!("patch application failed: {e}")))
}

/// Concatenate a text block's materialized `{"text": [...]}` value.
pub fn materialized_text(value: &serde_json::Value) -> String {
    value
        .get("text")
        .and_then(|v| v.as_array())
        .map(|chunks| {
            chunks
                .iter()
                .filter_map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

struct BlockState {
    kind: BlockKind,
    created_index: u64,
    value: serde_json::Value,
}

struct Inner {
    log: Vec<WireEvent>,
    subscribers: HashMap<u64, mpsc::Sender<WireEvent>>,
    next_subscriber_id: u64,
    terminal: bool,
    terminated_at: Option<Instant>,
}

impl Inner {
    /// Back-pressure policy (§5): cap the log, dropping only non-terminal
    /// heartbeats; block/updateBlock/end/error are never dropped.
    fn trim(&mut self) {
        const MAX_LOG: usize = 10_000;
        if self.log.len() <= MAX_LOG {
            return;
        }
        if let Some(pos) = self.log.iter().position(|e| e.kind == "heartbeat") {
            self.log.remove(pos);
        }
    }
}

/// A request-scoped streaming session (§3).
pub struct Session {
    pub id: SessionId,
    pub created_at: Instant,
    abort: CancellationToken,
    inner: Mutex<Inner>,
    blocks: RwLock<HashMap<BlockId, Mutex<BlockState>>>,
    next_event_id: AtomicU64,
    next_block_index: AtomicU64,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: SessionId::generate(),
            created_at: Instant::now(),
            abort: CancellationToken::new(),
            inner: Mutex::new(Inner {
                log: Vec::new(),
                subscribers: HashMap::new(),
                next_subscriber_id: 0,
                terminal: false,
                terminated_at: None,
            }),
            blocks: RwLock::new(HashMap::new()),
            next_event_id: AtomicU64::new(1),
            next_block_index: AtomicU64::new(0),
        }
    }

    pub fn abort_signal(&self) -> CancellationToken {
        self.abort.clone()
    }

    pub fn abort(&self) {
        self.abort.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    pub fn is_terminal(&self) -> bool {
        self.inner.lock().unwrap().terminal
    }

    /// When the session went terminal, if it has. Used by `SessionRegistry`
    /// to measure retention from termination rather than creation (§3
    /// Lifecycle: "retained briefly ... to support reconnect").
    pub fn terminated_at(&self) -> Option<Instant> {
        self.inner.lock().unwrap().terminated_at
    }

    /// Emit a new block with its full initial value; returns the block id.
    pub fn emit_block(&self, kind: BlockKind, value: serde_json::Value) -> Result<BlockId> {
        let id = BlockId::generate();
        let created_index = self.next_block_index.fetch_add(1, Ordering::SeqCst);
        {
            let mut blocks = self.blocks.write().unwrap();
            blocks.insert(
                id.clone(),
                Mutex::new(BlockState {
                    kind,
                    created_index,
                    value: value.clone(),
                }),
            );
        }
        let payload = serde_json::json!({
            "blockId": id.as_str(),
            "kind": kind.as_str(),
            "value": value,
        });
        self.emit("block", payload)?;
        Ok(id)
    }

    /// Apply a patch to an existing block and emit `updateBlock`.
    pub fn update_block(&self, id: &BlockId, patch_ops: Vec<serde_json::Value>) -> Result<()> {
        {
            let blocks = self.blocks.read().unwrap();
            let state = blocks.get(id).ok_or_else(|| {
                Error::InternalInvariantViolation(format!("updateBlock against unknown block {id}"))
            })?;
            let mut state = state.lock().unwrap();
            apply_patch(&mut state.value, &patch_ops)?;
        }
        let payload = serde_json::json!({
            "blockId": id.as_str(),
            "patch": patch_ops,
        });
        self.emit("updateBlock", payload)
    }

    /// Current materialized value of a block (used for reconnect hydration
    /// and by the orchestrator to assemble the final answer).
    pub fn block_value(&self, id: &BlockId) -> Option<serde_json::Value> {
        let blocks = self.blocks.read().unwrap();
        blocks.get(id).map(|s| s.lock().unwrap().value.clone())
    }

    /// All text blocks' materialized text, in emission order (§8 invariant:
    /// final answer = concatenation of text blocks in emission order).
    pub fn text_blocks_in_order(&self) -> Vec<String> {
        let blocks = self.blocks.read().unwrap();
        let mut entries: Vec<(u64, String)> = blocks
            .iter()
            .filter_map(|(_, s)| {
                let s = s.lock().unwrap();
                (s.kind == BlockKind::Text).then(|| (s.created_index, materialized_text(&s.value)))
            })
            .collect();
        entries.sort_by_key(|(idx, _)| *idx);
        entries.into_iter().map(|(_, t)| t).collect()
    }

    pub fn emit_research_progress(&self, step: usize, max_steps: usize, action_names: Vec<String>) -> Result<()> {
        let payload = serde_json::json!({
            "step": step,
            "maxSteps": max_steps,
            "actionNames": action_names,
        });
        self.emit("researchProgress", payload)
    }

    pub fn emit_heartbeat(&self) -> Result<()> {
        self.emit("heartbeat", serde_json::json!({}))
    }

    /// Terminal success event; disables further emission (§4.1).
    pub fn emit_end(&self, final_aggregate: &FinalAggregate) -> Result<()> {
        let payload = serde_json::to_value(final_aggregate)?;
        self.emit_terminal("end", payload)
    }

    /// Terminal failure event; idempotent — only the first call has effect,
    /// matching "at most one terminal event" (§8).
    pub fn emit_error(&self, code: &str, message: &str) {
        let payload = serde_json::json!({ "code": code, "message": message });
        if let Err(e) = self.emit_terminal("error", payload) {
            debug!("emit_error suppressed (session already terminal): {e}");
        }
    }

    fn emit_terminal(&self, kind: &'static str, payload: serde_json::Value) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.terminal {
            return Err(Error::InternalInvariantViolation(
                "emit after terminal event".to_string(),
            ));
        }
        let event_id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        let wire = WireEvent {
            kind,
            session_id: self.id.as_str().to_string(),
            event_id,
            payload,
        };
        inner.log.push(wire.clone());
        inner.terminal = true;
        inner.terminated_at = Some(Instant::now());
        Self::fan_out(&mut inner, wire);
        Ok(())
    }

    fn emit(&self, kind: &'static str, payload: serde_json::Value) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.terminal {
            return Err(Error::InternalInvariantViolation(
                "emit after terminal event".to_string(),
            ));
        }
        let event_id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        let wire = WireEvent {
            kind,
            session_id: self.id.as_str().to_string(),
            event_id,
            payload,
        };
        inner.log.push(wire.clone());
        inner.trim();
        Self::fan_out(&mut inner, wire);
        Ok(())
    }

    /// Fan out to every live subscriber; evict any whose channel is full or
    /// closed rather than letting a slow subscriber block the producer (§5).
    fn fan_out(inner: &mut Inner, wire: WireEvent) {
        let mut dead = Vec::new();
        for (id, tx) in inner.subscribers.iter() {
            if tx.try_send(wire.clone()).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            inner.subscribers.remove(&id);
            warn!("evicted slow/closed subscriber {id}");
        }
    }

    /// Subscribe from the beginning. Late subscribers get a replay of the log
    /// up to the current event id, then the live tail, with no gap (§4.1).
    pub fn subscribe(&self) -> mpsc::Receiver<WireEvent> {
        self.subscribe_from(0)
    }

    /// Subscribe for events strictly after `last_event_id` (reconnect, §6).
    pub fn subscribe_from(&self, last_event_id: u64) -> mpsc::Receiver<WireEvent> {
        let (tx, rx) = mpsc::channel(1024);
        let mut inner = self.inner.lock().unwrap();
        for ev in inner.log.iter().filter(|e| e.event_id > last_event_id) {
            let _ = tx.try_send(ev.clone());
        }
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.insert(id, tx);
        rx
    }

    pub fn event_log_len(&self) -> usize {
        self.inner.lock().unwrap().log.len()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide registry of live sessions, retained briefly to support
/// reconnect (§3 Lifecycle).
pub struct SessionRegistry {
    sessions: dashmap::DashMap<SessionId, std::sync::Arc<Session>>,
    retention: Duration,
}

impl SessionRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            sessions: dashmap::DashMap::new(),
            retention,
        }
    }

    pub fn insert(&self, session: std::sync::Arc<Session>) {
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn get(&self, id: &SessionId) -> Option<std::sync::Arc<Session>> {
        self.sessions.get(id).map(|s| s.clone())
    }

    pub fn remove(&self, id: &SessionId) {
        self.sessions.remove(id);
    }

    /// Sweep sessions that are terminal and past their retention window.
    /// Retention is measured from termination, not creation — a long-running
    /// request (e.g. Quality-mode research) must not already be past its
    /// retention window the instant it finishes.
    pub fn sweep(&self) {
        let retention = self.retention;
        self.sessions.retain(|_, s| match s.terminated_at() {
            Some(t) => t.elapsed() <= retention,
            None => true,
        });
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
