//! PDF text extraction and page splitting.
//!
//! Uploaded documents enter the pipeline as PDF bytes; this module turns
//! them into an ordered sequence of page texts. Extraction failure is an
//! error the indexer reports per file, never a panic.

/// Extraction error for a single document.
#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extracts a PDF into an ordered sequence of page texts.
///
/// `pdf-extract` emits a form feed between pages; pages that contain no
/// visible text are dropped so the chunker never sees empty input.
pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(split_pages(&text))
}

/// Splits raw extracted text on form-feed page breaks, trimming each page
/// and discarding blank ones. Page order is preserved.
pub fn split_pages(text: &str) -> Vec<String> {
    text.split('\u{c}')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect()
}
