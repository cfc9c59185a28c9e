//! Query-time retrieval over a session's document index.
//!
//! A [`Retriever`] is a transient view over the persistent index
//! configured for diversity-aware top-k search: candidates are ranked by
//! cosine similarity to the query, then re-ranked with maximal marginal
//! relevance so the returned chunks cover the corpus instead of piling up
//! near-duplicates. Opening a retriever for a session without an index
//! fails; callers must upload documents first.

use crate::config::Config;
use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::error::{ServiceError, ServiceResult};
use crate::index::{IndexedChunk, SessionIndex};
use crate::models::{ChunkMeta, SearchHit};

#[derive(Debug)]
pub struct Retriever {
    index: SessionIndex,
    top_k: usize,
    fetch_k: usize,
    mmr_lambda: f64,
}

impl Retriever {
    /// Open the session's existing index as a search handle. Fails with
    /// `RetrievalUnavailable` when the session has no index directory or
    /// the index holds no chunks — either way there is nothing to answer
    /// from until documents are uploaded.
    pub async fn open(config: &Config, session: &str) -> ServiceResult<Self> {
        let index = SessionIndex::open_existing(&config.storage, session).await?;
        if index.count().await? == 0 {
            index.close().await;
            return Err(ServiceError::RetrievalUnavailable(format!(
                "session '{}' has no indexed documents; upload documents first",
                session
            )));
        }
        let top_k = config.retrieval.top_k;
        Ok(Self {
            index,
            top_k,
            fetch_k: top_k * config.retrieval.fetch_factor.max(1),
            mmr_lambda: config.retrieval.mmr_lambda,
        })
    }

    /// Return up to `top_k` chunks most relevant to the query, in MMR
    /// selection order. No side effects.
    pub async fn search(
        &self,
        embedder: &dyn EmbeddingProvider,
        query: &str,
    ) -> ServiceResult<Vec<SearchHit>> {
        let query_vec = embedder
            .embed_query(query)
            .await
            .map_err(|e| ServiceError::Persistence(format!("query embedding failed: {}", e)))?;

        let candidates = self.index.fetch_all().await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Rank the candidate pool by similarity to the query.
        let mut scored: Vec<(f64, IndexedChunk)> = candidates
            .into_iter()
            .map(|c| {
                let sim = cosine_similarity(&query_vec, &c.embedding) as f64;
                (sim, c)
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.fetch_k);

        let order = mmr_select(&scored, self.top_k, self.mmr_lambda);

        Ok(order
            .into_iter()
            .map(|i| {
                let (score, chunk) = &scored[i];
                SearchHit {
                    text: chunk.text.clone(),
                    meta: ChunkMeta {
                        id: chunk.id.clone(),
                        source_file: chunk.source_file.clone(),
                        chunk: chunk.chunk_index,
                    },
                    score: *score,
                }
            })
            .collect())
    }

    pub async fn close(self) {
        self.index.close().await;
    }
}

/// Maximal marginal relevance selection over a relevance-sorted pool.
///
/// Greedily picks the candidate maximizing
/// `lambda * relevance - (1 - lambda) * max_similarity_to_selected`,
/// returning indices into the pool in selection order.
fn mmr_select(pool: &[(f64, IndexedChunk)], k: usize, lambda: f64) -> Vec<usize> {
    let mut selected: Vec<usize> = Vec::new();
    let mut remaining: Vec<usize> = (0..pool.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f64::NEG_INFINITY;

        for (pos, &cand) in remaining.iter().enumerate() {
            let relevance = pool[cand].0;
            let redundancy = selected
                .iter()
                .map(|&s| cosine_similarity(&pool[cand].1.embedding, &pool[s].1.embedding) as f64)
                .fold(f64::NEG_INFINITY, f64::max)
                .max(0.0);
            let score = lambda * relevance - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        selected.push(remaining.swap_remove(best_pos));
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, embedding: Vec<f32>, relevance: f64) -> (f64, IndexedChunk) {
        (
            relevance,
            IndexedChunk {
                id: id.to_string(),
                source_file: "t.pdf".to_string(),
                chunk_index: 0,
                text: String::new(),
                embedding,
            },
        )
    }

    #[test]
    fn mmr_empty_pool() {
        assert!(mmr_select(&[], 8, 0.5).is_empty());
    }

    #[test]
    fn mmr_returns_at_most_k() {
        let pool = vec![
            candidate("a", vec![1.0, 0.0], 0.9),
            candidate("b", vec![0.0, 1.0], 0.8),
            candidate("c", vec![0.5, 0.5], 0.7),
        ];
        assert_eq!(mmr_select(&pool, 2, 0.5).len(), 2);
        assert_eq!(mmr_select(&pool, 10, 0.5).len(), 3);
    }

    #[test]
    fn mmr_picks_most_relevant_first() {
        let pool = vec![
            candidate("a", vec![1.0, 0.0], 0.6),
            candidate("b", vec![0.0, 1.0], 0.9),
        ];
        let order = mmr_select(&pool, 2, 0.5);
        assert_eq!(pool[order[0]].1.id, "b");
    }

    #[test]
    fn mmr_penalizes_near_duplicates() {
        // "b" is an almost exact duplicate of "a" with slightly lower
        // relevance; "c" is orthogonal. Diversity should pull "c" ahead.
        let pool = vec![
            candidate("a", vec![1.0, 0.0], 0.90),
            candidate("b", vec![0.99, 0.01], 0.89),
            candidate("c", vec![0.0, 1.0], 0.50),
        ];
        let order = mmr_select(&pool, 2, 0.5);
        assert_eq!(pool[order[0]].1.id, "a");
        assert_eq!(pool[order[1]].1.id, "c");
    }

    #[test]
    fn mmr_lambda_one_is_pure_relevance() {
        let pool = vec![
            candidate("a", vec![1.0, 0.0], 0.9),
            candidate("b", vec![0.99, 0.01], 0.8),
            candidate("c", vec![0.0, 1.0], 0.7),
        ];
        let order = mmr_select(&pool, 3, 1.0);
        let ids: Vec<&str> = order.iter().map(|&i| pool[i].1.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
