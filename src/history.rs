//! Durable conversation log, one JSONL file per session.
//!
//! Each line is a `{"type":"human"|"ai","content":…}` record; order is
//! the conversation order and is never rewritten except by `save`, which
//! replaces the whole file with the caller-supplied sequence. Callers
//! appending a turn must therefore supply the complete history, and must
//! hold the session lock across the load-append-save sequence — two
//! concurrent rewrites race to a lost update otherwise.

use std::path::Path;

use tracing::warn;

use crate::config::StorageConfig;
use crate::error::ServiceResult;
use crate::models::ChatMessage;

/// True when the session's history log exists on disk.
pub fn history_exists(storage: &StorageConfig, session: &str) -> bool {
    storage.history_file(session).is_file()
}

/// Load a session's history from disk.
///
/// A missing file is an empty history, not an error — a new session with
/// no prior conversation. Malformed lines are skipped with a warning so
/// one corrupt record never hides the rest of the log.
pub fn load(storage: &StorageConfig, session: &str) -> ServiceResult<Vec<ChatMessage>> {
    let path = storage.history_file(session);
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    Ok(parse_log(&content, session, &path))
}

fn parse_log(content: &str, session: &str, path: &Path) -> Vec<ChatMessage> {
    let mut entries = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ChatMessage>(line) {
            Ok(msg) => entries.push(msg),
            Err(e) => {
                warn!(
                    session,
                    file = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "skipping malformed history line"
                );
            }
        }
    }
    entries
}

/// Overwrite the session's log with the given ordered sequence.
///
/// This is a full rewrite, not an append. Acceptable for conversation-
/// sized logs; the observable contract is that a subsequent [`load`]
/// returns an equivalent sequence.
pub fn save(storage: &StorageConfig, session: &str, entries: &[ChatMessage]) -> ServiceResult<()> {
    std::fs::create_dir_all(storage.history_root())?;

    let mut out = String::new();
    for entry in entries {
        // ChatMessage serialization is infallible for string content.
        let line = serde_json::to_string(entry)
            .map_err(|e| crate::error::ServiceError::Persistence(e.to_string()))?;
        out.push_str(&line);
        out.push('\n');
    }

    std::fs::write(storage.history_file(session), out)?;
    Ok(())
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

    #[test]
    fn missing_file_is_empty_history() {
        let tmp = TempDir::new().unwrap();
        let entries = load(&storage(&tmp), "fresh").unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn save_load_roundtrip_preserves_order() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);
        let entries = vec![
            ChatMessage::Human("first question".to_string()),
            ChatMessage::Ai("first answer".to_string()),
            ChatMessage::Human("second question".to_string()),
            ChatMessage::Ai("second answer".to_string()),
        ];

        save(&storage, "chat", &entries).unwrap();
        let loaded = load(&storage, "chat").unwrap();
        assert_eq!(loaded, entries);
    }

    #[test]
    fn save_overwrites_previous_log() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);
        save(
            &storage,
            "chat",
            &[ChatMessage::Human("old".to_string())],
        )
        .unwrap();
        save(&storage, "chat", &[ChatMessage::Ai("new".to_string())]).unwrap();

        let loaded = load(&storage, "chat").unwrap();
        assert_eq!(loaded, vec![ChatMessage::Ai("new".to_string())]);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);
        std::fs::create_dir_all(storage.history_root()).unwrap();
        std::fs::write(
            storage.history_file("chat"),
            "{\"type\":\"human\",\"content\":\"ok\"}\nnot json at all\n{\"type\":\"ai\",\"content\":\"fine\"}\n",
        )
        .unwrap();

        let loaded = load(&storage, "chat").unwrap();
        assert_eq!(
            loaded,
            vec![
                ChatMessage::Human("ok".to_string()),
                ChatMessage::Ai("fine".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_role_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);
        std::fs::create_dir_all(storage.history_root()).unwrap();
        std::fs::write(
            storage.history_file("chat"),
            "{\"type\":\"system\",\"content\":\"x\"}\n{\"type\":\"human\",\"content\":\"kept\"}\n",
        )
        .unwrap();

        let loaded = load(&storage, "chat").unwrap();
        assert_eq!(loaded, vec![ChatMessage::Human("kept".to_string())]);
    }

    #[test]
    fn exists_tracks_file_presence() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);
        assert!(!history_exists(&storage, "chat"));
        save(&storage, "chat", &[]).unwrap();
        assert!(history_exists(&storage, "chat"));
    }
}
