//! Session operations and the question-answering pipeline.
//!
//! [`ChatService`] owns the configuration, the session registry, and the
//! two external collaborators (embedder, language model). Every exposed
//! operation — create, rename, list, clear, upload, ask, history —
//! goes through here; the HTTP layer and CLI are thin callers.
//!
//! Locking discipline: session-scoped operations hold the registry's
//! shared gate for their duration; `rename` and `clear_all` take it
//! exclusively because they touch more than one session's namespace at
//! once. The per-session mutex is held only around cache reads and the
//! history read-modify-write; retrieval, embedding, and model generation
//! run outside it.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::{ServiceError, ServiceResult};
use crate::history;
use crate::index::{self, SessionIndex};
use crate::indexer::{self, IndexReport};
use crate::llm::{LanguageModel, OllamaModel};
use crate::models::{ChatMessage, ChunkMeta, SearchHit};
use crate::name::validate_session_name;
use crate::registry::SessionRegistry;
use crate::retriever::Retriever;

/// Prompt template for document-grounded answering. The refusal sentence
/// is part of the contract: the model must answer only from the supplied
/// excerpts and say so when it cannot.
const PROMPT_TEMPLATE: &str = "\
You are a helpful assistant.
Your primary goal is to answer questions ONLY based on the provided context.
Do NOT make up information or introduce external knowledge.
If the answer cannot be found in the provided context, state \"I cannot answer this question based on the provided documents.\"

Here are some relevant excerpts from official sources:
{context}

Here is the conversation history:
{chat_history}

Based on the provided context and conversation history, answer the following question.
Provide a detailed, comprehensive, and thorough answer, elaborating on all relevant points found in the documents.
Organize your response in clear, well-structured paragraphs or bullet points to ensure it is informative.
Unless a specific word count is mentioned in the question, aim for an answer length of approximately 500 words.
{question}
";

/// Answer plus the citation metadata of every retrieved chunk.
#[derive(Debug)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<ChunkMeta>,
}

pub struct ChatService {
    config: Config,
    registry: SessionRegistry,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LanguageModel>,
}

impl ChatService {
    /// Build a service with explicit collaborators. Tests inject stubs
    /// here; production code uses [`ChatService::from_config`].
    pub fn new(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            config,
            registry: SessionRegistry::new(),
            embedder,
            llm,
        }
    }

    /// Build a service wired to the configured Ollama endpoints.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = create_provider(&config.embedding)?.into();
        let llm: Arc<dyn LanguageModel> = Arc::new(OllamaModel::new(&config.llm)?);
        Ok(Self::new(config, embedder, llm))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create the three root namespaces. Idempotent.
    pub fn init_dirs(&self) -> ServiceResult<()> {
        std::fs::create_dir_all(self.config.storage.index_root())?;
        std::fs::create_dir_all(self.config.storage.uploads_root())?;
        std::fs::create_dir_all(self.config.storage.history_root())?;
        Ok(())
    }

    // ============ Session admin ============

    /// Create a session under the desired name, or a generated unique id
    /// when no name is given. Fails with `Conflict` when any of the three
    /// artifacts already exists under that name.
    pub async fn create(&self, desired_name: Option<&str>) -> ServiceResult<String> {
        let _gate = self.registry.shared().await;

        let session = match desired_name {
            Some(raw) => {
                let name = validate_session_name(raw)
                    .map_err(|reason| ServiceError::InvalidRequest(format!("invalid chat name: {}", reason)))?;
                if self.artifacts_exist(&name) || self.registry.contains(&name) {
                    return Err(ServiceError::Conflict(format!(
                        "chat name '{}' already exists",
                        name
                    )));
                }
                name
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        history::save(&self.config.storage, &session, &[])?;
        std::fs::create_dir_all(self.config.storage.uploads_dir(&session))?;
        // Materialize the index directory so the new session is listable
        // before any document is uploaded.
        let index = SessionIndex::open_or_create(&self.config.storage, &session).await?;
        index.close().await;

        self.registry.insert_empty(&session);
        info!(session, "created chat session");
        Ok(session)
    }

    /// Rename a session, moving all three artifacts to the new namespace.
    ///
    /// Holds the registry's exclusive gate for the duration: the move
    /// spans two session namespaces, so every in-flight session operation
    /// is waited out and none (including a `create` racing for the new
    /// name) can start until the move completes.
    ///
    /// Runs as a saga: each completed filesystem move is recorded, and on
    /// failure the completed moves are reversed in order before the error
    /// surfaces. Not transactional across a process crash.
    pub async fn rename(&self, old_id: &str, new_name: &str) -> ServiceResult<String> {
        let _gate = self.registry.exclusive().await;

        let new_id = validate_session_name(new_name)
            .map_err(|reason| ServiceError::InvalidRequest(format!("invalid chat name: {}", reason)))?;

        if !self.artifacts_exist(old_id) && !self.registry.contains(old_id) {
            return Err(ServiceError::NotFound(format!(
                "chat '{}' not found, cannot rename",
                old_id
            )));
        }
        if self.artifacts_exist(&new_id) || self.registry.contains(&new_id) {
            return Err(ServiceError::Conflict(format!(
                "chat name '{}' already exists",
                new_id
            )));
        }

        // The cached retriever points at the old index path; drop it.
        // The slot lock is uncontended under the exclusive gate.
        if let Some(slot) = self.registry.get(old_id) {
            slot.state.lock().await.retriever = None;
        }

        let storage = &self.config.storage;
        let moves = [
            (storage.index_dir(old_id), storage.index_dir(&new_id), true),
            (storage.uploads_dir(old_id), storage.uploads_dir(&new_id), true),
            (
                storage.history_file(old_id),
                storage.history_file(&new_id),
                false,
            ),
        ];

        // Completed renames, for compensation on failure.
        let mut completed: Vec<(&PathBuf, &PathBuf)> = Vec::new();

        for (old_path, new_path, is_dir) in &moves {
            let result: Result<bool, String> = if old_path.exists() {
                std::fs::rename(old_path, new_path)
                    .map(|_| true)
                    .map_err(|e| e.to_string())
            } else if *is_dir {
                // Tolerate partially-initialized sessions: materialize an
                // empty artifact under the new name instead of failing.
                std::fs::create_dir_all(new_path)
                    .map(|_| false)
                    .map_err(|e| e.to_string())
            } else {
                history::save(storage, &new_id, &[])
                    .map(|_| false)
                    .map_err(|e| e.to_string())
            };

            match result {
                Ok(true) => completed.push((old_path, new_path)),
                Ok(false) => {}
                Err(e) => {
                    error!(old = old_id, new = %new_id, error = %e, "rename failed, compensating");
                    for (orig, moved) in completed.iter().rev() {
                        if let Err(undo_err) = std::fs::rename(moved, orig) {
                            error!(
                                path = %moved.display(),
                                error = %undo_err,
                                "compensating move failed; artifacts may be inconsistent"
                            );
                        }
                    }
                    return Err(ServiceError::Persistence(format!(
                        "failed to rename chat: {}",
                        e
                    )));
                }
            }
        }

        self.registry.rename_key(old_id, &new_id);
        info!(old = old_id, new = %new_id, "renamed chat session");
        Ok(new_id)
    }

    /// Enumerate session ids by scanning the index namespace. The index
    /// directory is the authoritative existence signal; `create` always
    /// materializes it, so created sessions are never invisible here.
    pub fn list(&self) -> ServiceResult<Vec<String>> {
        let root = self.config.storage.index_root();
        let entries = match std::fs::read_dir(&root) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Wipe the registry cache and all three namespaces, then recreate
    /// them empty. Holds the exclusive gate, so no session operation runs
    /// concurrently. Irreversible; confirmation is the caller's job.
    pub async fn clear_all(&self) -> ServiceResult<()> {
        let _gate = self.registry.exclusive().await;
        self.registry.wipe();

        let storage = &self.config.storage;
        for root in [
            storage.index_root(),
            storage.uploads_root(),
            storage.history_root(),
        ] {
            match std::fs::remove_dir_all(&root) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            std::fs::create_dir_all(&root)?;
        }

        info!("cleared all chat data");
        Ok(())
    }

    // ============ Documents ============

    /// Persist one uploaded file's bytes into the session's upload store
    /// and return the stored path. The filename is validated as a bare
    /// component so it cannot escape the uploads directory.
    pub fn store_upload(
        &self,
        session: &str,
        filename: &str,
        bytes: &[u8],
    ) -> ServiceResult<PathBuf> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..")
        {
            return Err(ServiceError::InvalidRequest(format!(
                "invalid upload filename: '{}'",
                filename
            )));
        }

        let dir = self.config.storage.uploads_dir(session);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(filename);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Index a batch of stored documents into the session's index and
    /// refresh the cached retriever. The session must already exist.
    pub async fn index_documents(
        &self,
        session: &str,
        paths: &[PathBuf],
    ) -> ServiceResult<IndexReport> {
        let _gate = self.registry.shared().await;
        let slot = self.registry.resolve(&self.config.storage, session)?;

        let report =
            indexer::index_files(&self.config, self.embedder.as_ref(), session, paths).await?;

        // Refresh the retriever so the next question sees the new chunks.
        // A batch where every file was skipped leaves the index empty;
        // that is still a successful no-op upload.
        match Retriever::open(&self.config, session).await {
            Ok(retriever) => {
                slot.state.lock().await.retriever = Some(Arc::new(retriever));
            }
            Err(ServiceError::RetrievalUnavailable(_)) => {
                slot.state.lock().await.retriever = None;
            }
            Err(e) => return Err(e),
        }

        Ok(report)
    }

    /// Copy external files into the session's upload store, then index
    /// them. Unreadable files are skipped with a warning, matching the
    /// best-effort per-file policy of the indexer.
    pub async fn upload_files(&self, session: &str, files: &[PathBuf]) -> ServiceResult<IndexReport> {
        {
            let _gate = self.registry.shared().await;
            self.registry.resolve(&self.config.storage, session)?;
        }

        let mut stored = Vec::new();
        for path in files {
            let Some(filename) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                warn!(session, path = %path.display(), "skipping path without filename");
                continue;
            };
            match std::fs::read(path) {
                Ok(bytes) => stored.push(self.store_upload(session, &filename, &bytes)?),
                Err(e) => {
                    warn!(session, path = %path.display(), error = %e, "skipping unreadable upload");
                }
            }
        }

        self.index_documents(session, &stored).await
    }

    // ============ Answering ============

    /// Answer a question from the session's documents and history.
    ///
    /// The retrieved context and the running transcript are formatted
    /// into a fixed prompt; the model's answer is appended to the history
    /// (memory and disk) only after generation succeeds, so a failed
    /// generation can always be retried without duplicating turns.
    pub async fn ask(&self, session: &str, question: &str) -> ServiceResult<Answer> {
        let _gate = self.registry.shared().await;
        let slot = self.registry.resolve(&self.config.storage, session)?;

        let question = question.trim();
        if question.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "no question provided".to_string(),
            ));
        }

        // Snapshot history and obtain the retriever under the session
        // lock, then release it for the slow retrieval + generation path.
        let (retriever, prior_history) = {
            let mut state = slot.state.lock().await;
            let retriever = match &state.retriever {
                Some(r) => r.clone(),
                None => {
                    let opened = Retriever::open(&self.config, session).await?;
                    let arc = Arc::new(opened);
                    state.retriever = Some(arc.clone());
                    arc
                }
            };
            (retriever, state.history.clone())
        };

        let hits = retriever.search(self.embedder.as_ref(), question).await?;
        let context = format_context(&hits);
        let transcript = format_transcript(&prior_history);
        let prompt = build_prompt(&context, &transcript, question);

        info!(session, retrieved = hits.len(), "invoking language model");
        let answer = self
            .llm
            .generate(&prompt)
            .await
            .map_err(|e| ServiceError::GenerationFailed(e.to_string()))?;

        // Append the turn: full read-modify-write of the log under the
        // session lock, end to end.
        {
            let mut state = slot.state.lock().await;
            state.history.push(ChatMessage::Human(question.to_string()));
            state.history.push(ChatMessage::Ai(answer.clone()));
            if let Err(e) = history::save(&self.config.storage, session, &state.history) {
                // Cache is now ahead of disk; surfaced, not hidden.
                error!(session, error = %e, "failed to persist history; cache ahead of disk");
                return Err(e);
            }
        }

        Ok(Answer {
            answer,
            sources: hits.into_iter().map(|h| h.meta).collect(),
        })
    }

    /// Resolve a session, rehydrating if needed, without touching it.
    /// Used by the request layer to 404 before accepting an upload body.
    pub async fn ensure_session(&self, session: &str) -> ServiceResult<()> {
        let _gate = self.registry.shared().await;
        self.registry.resolve(&self.config.storage, session)?;
        Ok(())
    }

    /// Return the session's conversation history in order.
    pub async fn load_history(&self, session: &str) -> ServiceResult<Vec<ChatMessage>> {
        let _gate = self.registry.shared().await;
        let slot = self.registry.resolve(&self.config.storage, session)?;
        let state = slot.state.lock().await;
        Ok(state.history.clone())
    }

    fn artifacts_exist(&self, session: &str) -> bool {
        let storage = &self.config.storage;
        index::index_exists(storage, session)
            || storage.uploads_dir(session).is_dir()
            || history::history_exists(storage, session)
    }
}

// ============ Prompt assembly ============

/// Render retrieved chunks as labeled excerpts in rank order, each headed
/// by its source file and chunk number, joined by blank lines.
fn format_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| {
            format!(
                "[Source: {}, Chunk: {}]\n{}",
                hit.meta.source_file,
                hit.meta.chunk,
                hit.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render prior history as a transcript, one `Human:`/`AI:` line per
/// entry in chronological order.
fn format_transcript(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|msg| match msg {
            ChatMessage::Human(text) => format!("Human: {}", text),
            ChatMessage::Ai(text) => format!("AI: {}", text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_prompt(context: &str, transcript: &str, question: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{context}", context)
        .replace("{chat_history}", transcript)
        .replace("{question}", question)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(file: &str, chunk: i64, text: &str) -> SearchHit {
        SearchHit {
            text: text.to_string(),
            meta: ChunkMeta {
                id: format!("{}_{}", file, chunk),
                source_file: file.to_string(),
                chunk,
            },
            score: 0.5,
        }
    }

    #[test]
    fn context_block_labels_and_joins_excerpts() {
        let hits = vec![
            hit("a.pdf", 0, "  first excerpt  "),
            hit("b.pdf", 3, "second excerpt"),
        ];
        let context = format_context(&hits);
        assert_eq!(
            context,
            "[Source: a.pdf, Chunk: 0]\nfirst excerpt\n\n[Source: b.pdf, Chunk: 3]\nsecond excerpt"
        );
    }

    #[test]
    fn empty_hits_give_empty_context() {
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn transcript_renders_roles_in_order() {
        let history = vec![
            ChatMessage::Human("What is X?".to_string()),
            ChatMessage::Ai("X is Y.".to_string()),
        ];
        assert_eq!(format_transcript(&history), "Human: What is X?\nAI: X is Y.");
    }

    #[test]
    fn prompt_embeds_all_sections_and_refusal_clause() {
        let prompt = build_prompt("CTX", "Human: hi", "What is X?");
        assert!(prompt.contains("CTX"));
        assert!(prompt.contains("Human: hi"));
        assert!(prompt.contains("What is X?"));
        assert!(prompt.contains("I cannot answer this question based on the provided documents."));
        assert!(prompt.contains("approximately 500 words"));
        assert!(!prompt.contains("{context}"));
        assert!(!prompt.contains("{chat_history}"));
        assert!(!prompt.contains("{question}"));
    }
}
