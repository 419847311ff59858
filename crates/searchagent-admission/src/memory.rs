//! Per-user conversation memory (§5): process-wide, keyed by user id, writes
//! serialized per key via a per-entry mutex. Swept by the stale-context
//! flusher in `flusher.rs`.

use dashmap::DashMap;
use searchagent_core::{ChatTurn, UserId};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    turns: Vec<ChatTurn>,
    last_used: Instant,
}

pub struct ConversationMemory {
    entries: DashMap<UserId, Mutex<Entry>>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    pub fn append(&self, user: &UserId, turns: impl IntoIterator<Item = ChatTurn>) {
        let entry = self.entries.entry(user.clone()).or_insert_with(|| {
            Mutex::new(Entry { turns: Vec::new(), last_used: Instant::now() })
        });
        let mut entry = entry.lock().unwrap();
        entry.turns.extend(turns);
        entry.last_used = Instant::now();
    }

    pub fn get(&self, user: &UserId) -> Vec<ChatTurn> {
        match self.entries.get(user) {
            Some(entry) => {
                let mut entry = entry.lock().unwrap();
                entry.last_used = Instant::now();
                entry.turns.clone()
            }
            None => Vec::new(),
        }
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.entries.contains_key(user)
    }

    /// Drop entries idle for longer than `idle`.
    pub fn sweep(&self, idle: Duration) {
        self.entries.retain(|_, entry| entry.lock().unwrap().last_used.elapsed() <= idle);
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchagent_core::ChatRole;

    fn turn(content: &str) -> ChatTurn {
        ChatTurn {
            role: ChatRole::User,
            content: content.to_string(),
            tool_call: None,
            tool_call_id: None,
        }
    }

    #[test]
    fn append_and_get_round_trip() {
        let memory = ConversationMemory::new();
        let user = UserId::new("u1");
        memory.append(&user, vec![turn("hi")]);
        let turns = memory.get(&user);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content, "hi");
    }

    #[test]
    fn sweep_drops_idle_entries_only() {
        let memory = ConversationMemory::new();
        let stale = UserId::new("stale");
        let fresh = UserId::new("fresh");
        memory.append(&stale, vec![turn("old")]);
        std::thread::sleep(Duration::from_millis(15));
        memory.append(&fresh, vec![turn("new")]);

        memory.sweep(Duration::from_millis(10));
        assert!(!memory.contains(&stale));
        assert!(memory.contains(&fresh));
    }
}
