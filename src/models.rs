//! Core data types shared across the indexing and answering pipeline.

use serde::{Deserialize, Serialize};

/// One entry in a session's conversation log.
///
/// A turn is always two entries appended in order: the human question,
/// then the model's answer. Serialized as newline-delimited JSON records
/// (`{"type":"human","content":"…"}`), one per line, order-significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum ChatMessage {
    Human(String),
    Ai(String),
}

impl ChatMessage {
    pub fn content(&self) -> &str {
        match self {
            ChatMessage::Human(s) | ChatMessage::Ai(s) => s,
        }
    }
}

/// A bounded span of source-document text, the unit of indexing and
/// retrieval. `id` is derived as `{source_file}_{chunk_index}` so that
/// re-uploading the same filename replaces its prior chunks by upsert.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub source_file: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

impl Chunk {
    pub fn meta(&self) -> ChunkMeta {
        ChunkMeta {
            id: self.id.clone(),
            source_file: self.source_file.clone(),
            chunk: self.chunk_index,
        }
    }
}

/// Citation metadata for a retrieved chunk, returned alongside answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub id: String,
    pub source_file: String,
    pub chunk: i64,
}

/// A retrieval result: chunk text plus metadata and a relevance score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub text: String,
    pub meta: ChunkMeta,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_json_shape_matches_log_format() {
        let human = ChatMessage::Human("What is X?".to_string());
        let json = serde_json::to_string(&human).unwrap();
        assert_eq!(json, r#"{"type":"human","content":"What is X?"}"#);

        let ai: ChatMessage =
            serde_json::from_str(r#"{"type":"ai","content":"X is Y."}"#).unwrap();
        assert_eq!(ai, ChatMessage::Ai("X is Y.".to_string()));
    }
}
