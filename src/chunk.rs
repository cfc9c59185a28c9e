//! Overlapping character-window chunker.
//!
//! Splits a document's ordered pages into chunks of at most `chunk_chars`
//! characters with `overlap_chars` of carry-over between consecutive
//! chunks, preferring to break on paragraph, line, then word boundaries.
//!
//! Chunk indices are contiguous per source file across all of its pages,
//! and each chunk id is the deterministic `{filename}_{index}` so that
//! re-chunking the same file yields the same ids (upsert replaces prior
//! chunks instead of accumulating duplicates).

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Split a file's pages into overlapping chunks tagged with the source
/// filename. Returns chunks with contiguous indices starting at 0.
pub fn chunk_pages(
    source_file: &str,
    pages: &[String],
    chunk_chars: usize,
    overlap_chars: usize,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut index: i64 = 0;

    for page in pages {
        for piece in split_overlapping(page, chunk_chars, overlap_chars) {
            chunks.push(make_chunk(source_file, index, piece));
            index += 1;
        }
    }

    chunks
}

/// Produce overlapping windows over one page. Each window ends on the
/// latest paragraph, line, or word boundary that fits; the next window
/// starts `overlap` characters before the previous end.
fn split_overlapping(text: &str, max_chars: usize, overlap: usize) -> Vec<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.len() <= max_chars {
        return vec![trimmed];
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;

    while start < trimmed.len() {
        let hard_end = floor_char_boundary(trimmed, (start + max_chars).min(trimmed.len()));
        let window = &trimmed[start..hard_end];

        let end = if hard_end == trimmed.len() {
            hard_end
        } else {
            // Prefer the latest natural boundary inside the window.
            let boundary = window
                .rfind("\n\n")
                .or_else(|| window.rfind('\n'))
                .or_else(|| window.rfind(' '))
                .filter(|&pos| pos > overlap);
            match boundary {
                Some(pos) => start + pos,
                None => hard_end,
            }
        };

        let piece = trimmed[start..end].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }

        if end == trimmed.len() {
            break;
        }

        // Step back by the overlap, but always make forward progress.
        let next = end.saturating_sub(overlap).max(start + 1);
        start = ceil_char_boundary(trimmed, next);
    }

    pieces
}

fn make_chunk(source_file: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: format!("{}_{}", source_file, index),
        source_file: source_file.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn small_page_single_chunk() {
        let chunks = chunk_pages("a.pdf", &pages(&["Hello, world!"]), 1500, 300);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "a.pdf_0");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn indices_contiguous_across_pages() {
        let chunks = chunk_pages("a.pdf", &pages(&["page one", "page two", "page three"]), 1500, 300);
        let indices: Vec<i64> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(chunks[2].id, "a.pdf_2");
    }

    #[test]
    fn long_page_produces_overlapping_chunks() {
        let text = (0..100)
            .map(|i| format!("Sentence number {} fills out the page.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_pages("big.pdf", &pages(&[&text]), 200, 40);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 200, "chunk too long: {}", c.text.len());
        }
        // Consecutive chunks share overlap text.
        let first = &chunks[0].text;
        let second = &chunks[1].text;
        let tail = &first[first.len().saturating_sub(20)..];
        assert!(
            second.contains(tail.trim()),
            "expected overlap between consecutive chunks"
        );
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let text = format!("{}\n\n{}", "a".repeat(120), "b".repeat(120));
        let chunks = chunk_pages("p.pdf", &pages(&[&text]), 200, 10);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.chars().all(|c| c == 'a'));
    }

    #[test]
    fn empty_pages_yield_no_chunks() {
        let chunks = chunk_pages("e.pdf", &pages(&["", "   "]), 1500, 300);
        assert!(chunks.is_empty());
    }

    #[test]
    fn deterministic_ids_and_hashes() {
        let text = (0..40)
            .map(|i| format!("Paragraph {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let a = chunk_pages("r.pdf", &pages(&[&text]), 120, 30);
        let b = chunk_pages("r.pdf", &pages(&[&text]), 120, 30);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.hash, y.hash);
            assert_eq!(x.text, y.text);
        }
    }

    #[test]
    fn multibyte_text_does_not_split_mid_character() {
        let text = "é".repeat(500);
        let chunks = chunk_pages("u.pdf", &pages(&[&text]), 100, 20);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.text.chars().all(|ch| ch == 'é'));
        }
    }
}
