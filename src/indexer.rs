//! Document indexing pipeline.
//!
//! Turns a batch of uploaded PDF paths into committed, embedded chunks in
//! the session's index: load → pages → overlapping chunks → embed →
//! upsert. Batch upload is best-effort per file: paths that are missing,
//! not PDFs, or fail extraction are skipped with a warning. Embedding or
//! storage failures propagate, but chunks committed for earlier files in
//! the batch stay committed — there is no batch rollback.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::chunk::chunk_pages;
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::{ServiceError, ServiceResult};
use crate::extract::extract_pdf_pages;
use crate::index::SessionIndex;

/// Outcome of one indexing batch.
#[derive(Debug, Default)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub chunks_committed: usize,
}

/// Index a batch of files into the session's persistent index.
///
/// Opens or creates the index first, so a zero-file call still
/// materializes the session's index directory and succeeds. Commits
/// per file; each file's chunks are durable before the next file starts.
pub async fn index_files(
    config: &Config,
    embedder: &dyn EmbeddingProvider,
    session: &str,
    paths: &[PathBuf],
) -> ServiceResult<IndexReport> {
    let index = SessionIndex::open_or_create(&config.storage, session).await?;
    let mut report = IndexReport::default();

    for path in paths {
        let Some(filename) = eligible_filename(path) else {
            warn!(session, path = %path.display(), "skipping invalid file");
            report.files_skipped += 1;
            continue;
        };

        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                warn!(session, file = filename, error = %e, "skipping unreadable file");
                report.files_skipped += 1;
                continue;
            }
        };

        let pages = match extract_pdf_pages(&bytes) {
            Ok(p) => p,
            Err(e) => {
                warn!(session, file = filename, error = %e, "skipping file that failed extraction");
                report.files_skipped += 1;
                continue;
            }
        };

        let chunks = chunk_pages(
            &filename,
            &pages,
            config.chunking.chunk_chars,
            config.chunking.overlap_chars,
        );
        if chunks.is_empty() {
            warn!(session, file = filename, "no text extracted, nothing to index");
            report.files_skipped += 1;
            continue;
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder
            .embed(&texts)
            .await
            .map_err(|e| ServiceError::Persistence(format!("embedding failed: {}", e)))?;

        index
            .upsert_chunks(&chunks, &embeddings, embedder.model_name())
            .await?;

        info!(
            session,
            file = filename,
            chunks = chunks.len(),
            "indexed document"
        );
        report.files_indexed += 1;
        report.chunks_committed += chunks.len();
    }

    index.close().await;
    Ok(report)
}

/// Returns the filename for paths that exist and carry the `.pdf`
/// extension; everything else is ineligible for indexing.
fn eligible_filename(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    let ext = path.extension()?.to_str()?;
    if !ext.eq_ignore_ascii_case("pdf") {
        return None;
    }
    Some(path.file_name()?.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligible_filename_requires_pdf_extension() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pdf = tmp.path().join("doc.pdf");
        let txt = tmp.path().join("doc.txt");
        std::fs::write(&pdf, b"x").unwrap();
        std::fs::write(&txt, b"x").unwrap();

        assert_eq!(eligible_filename(&pdf).as_deref(), Some("doc.pdf"));
        assert_eq!(eligible_filename(&txt), None);
        assert_eq!(eligible_filename(&tmp.path().join("missing.pdf")), None);
    }

    #[test]
    fn eligible_filename_accepts_uppercase_extension() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pdf = tmp.path().join("REPORT.PDF");
        std::fs::write(&pdf, b"x").unwrap();
        assert_eq!(eligible_filename(&pdf).as_deref(), Some("REPORT.PDF"));
    }
}
