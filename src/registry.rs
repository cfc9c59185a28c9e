//! Process-wide session registry.
//!
//! Maps each session id to its live in-memory state: the cached
//! conversation history and a lazily built retriever. The cache is a
//! performance optimization, not a source of truth — the filesystem is,
//! and a cache miss rehydrates from disk when the session's durable
//! artifacts exist.
//!
//! Locking layers, innermost to outermost:
//! - each session slot carries a `tokio::Mutex` serializing mutations of
//!   that one session (history append is a full-log read-modify-write);
//! - the map itself sits behind a brief `std::sync::Mutex` for structural
//!   changes (insert, rename, wipe);
//! - a registry-wide `RwLock` gate lets `rename` and `clear_all` exclude
//!   every concurrent session operation while ordinary operations only
//!   take it shared and proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::config::StorageConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::history;
use crate::index;
use crate::models::ChatMessage;
use crate::retriever::Retriever;

/// Live state for one session, guarded by the slot's mutex.
///
/// The retriever is shared behind an `Arc` so callers can clone the
/// handle out of the lock and search without holding the slot.
#[derive(Debug)]
pub struct SessionState {
    pub history: Vec<ChatMessage>,
    pub retriever: Option<Arc<Retriever>>,
}

impl SessionState {
    fn new(history: Vec<ChatMessage>) -> Self {
        Self {
            history,
            retriever: None,
        }
    }
}

/// One registry entry. The mutex serializes all mutating operations on
/// this session id.
#[derive(Debug)]
pub struct SessionSlot {
    pub state: tokio::sync::Mutex<SessionState>,
}

pub struct SessionRegistry {
    gate: tokio::sync::RwLock<()>,
    sessions: Mutex<HashMap<String, Arc<SessionSlot>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            gate: tokio::sync::RwLock::new(()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Shared guard held by session-scoped operations for their duration.
    pub async fn shared(&self) -> tokio::sync::RwLockReadGuard<'_, ()> {
        self.gate.read().await
    }

    /// Exclusive guard for operations spanning more than one session
    /// namespace (`rename`, `clear_all`): waits out all in-flight session
    /// operations and blocks new ones until dropped.
    pub async fn exclusive(&self) -> tokio::sync::RwLockWriteGuard<'_, ()> {
        self.gate.write().await
    }

    pub fn contains(&self, session: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(session)
    }

    pub fn get(&self, session: &str) -> Option<Arc<SessionSlot>> {
        self.sessions.lock().unwrap().get(session).cloned()
    }

    /// Insert a fresh cache entry for a newly created session. If a slot
    /// already exists (racing creators), the existing one wins.
    pub fn insert_empty(&self, session: &str) -> Arc<SessionSlot> {
        let mut map = self.sessions.lock().unwrap();
        map.entry(session.to_string())
            .or_insert_with(|| {
                Arc::new(SessionSlot {
                    state: tokio::sync::Mutex::new(SessionState::new(Vec::new())),
                })
            })
            .clone()
    }

    /// Resolve a session to its live slot, rehydrating from disk on a
    /// cache miss. Fails with `NotFound` when neither the index directory
    /// nor the history log exists — there is no such session.
    pub fn resolve(&self, storage: &StorageConfig, session: &str) -> ServiceResult<Arc<SessionSlot>> {
        if let Some(slot) = self.get(session) {
            return Ok(slot);
        }

        if !index::index_exists(storage, session) && !history::history_exists(storage, session) {
            return Err(ServiceError::NotFound(format!(
                "no session data found for '{}'",
                session
            )));
        }

        let loaded = history::load(storage, session)?;
        info!(session, entries = loaded.len(), "rehydrated session from disk");

        let mut map = self.sessions.lock().unwrap();
        Ok(map
            .entry(session.to_string())
            .or_insert_with(|| {
                Arc::new(SessionSlot {
                    state: tokio::sync::Mutex::new(SessionState::new(loaded)),
                })
            })
            .clone())
    }

    /// Move a cache entry from one id to another. A missing old entry is
    /// fine (the session may never have been touched this process).
    pub fn rename_key(&self, old: &str, new: &str) {
        let mut map = self.sessions.lock().unwrap();
        if let Some(slot) = map.remove(old) {
            map.insert(new.to_string(), slot);
        }
    }

    /// Drop every cached entry. Callers must hold the exclusive gate.
    pub fn wipe(&self) {
        self.sessions.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(tmp: &TempDir) -> StorageConfig {
        StorageConfig {
            data_dir: tmp.path().to_path_buf(),
        }
    }

    #[tokio::test]
    async fn resolve_unknown_session_fails() {
        let tmp = TempDir::new().unwrap();
        let registry = SessionRegistry::new();
        let err = registry.resolve(&storage(&tmp), "ghost").unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn resolve_rehydrates_from_history_file() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);
        history::save(
            &storage,
            "old",
            &[ChatMessage::Human("q".to_string()), ChatMessage::Ai("a".to_string())],
        )
        .unwrap();

        let registry = SessionRegistry::new();
        assert!(!registry.contains("old"));
        let slot = registry.resolve(&storage, "old").unwrap();
        assert_eq!(slot.state.lock().await.history.len(), 2);
        assert!(registry.contains("old"));
    }

    #[tokio::test]
    async fn resolve_rehydrates_from_index_dir_with_empty_history() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);
        std::fs::create_dir_all(storage.index_dir("indexed-only")).unwrap();

        let registry = SessionRegistry::new();
        let slot = registry.resolve(&storage, "indexed-only").unwrap();
        assert!(slot.state.lock().await.history.is_empty());
    }

    #[tokio::test]
    async fn rename_key_moves_cached_state() {
        let registry = SessionRegistry::new();
        let slot = registry.insert_empty("alpha");
        slot.state
            .lock()
            .await
            .history
            .push(ChatMessage::Human("kept".to_string()));

        registry.rename_key("alpha", "beta");
        assert!(!registry.contains("alpha"));
        let moved = registry.get("beta").unwrap();
        assert_eq!(moved.state.lock().await.history.len(), 1);
    }

    #[tokio::test]
    async fn wipe_empties_the_map() {
        let registry = SessionRegistry::new();
        registry.insert_empty("a");
        registry.insert_empty("b");
        let _guard = registry.exclusive().await;
        registry.wipe();
        assert!(!registry.contains("a"));
        assert!(!registry.contains("b"));
    }
}
