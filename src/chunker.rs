//! Paragraph chunking of extracted page text.

use crate::extractor::ExtractedPage;

/// Delimiter separating candidate chunks within a page's text.
pub const CHUNK_DELIMITER: &str = "\n\n";

/// Chunking tuning knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkerConfig {
    /// Optional cap on the number of chunks kept across the whole document.
    /// `None` keeps every chunk.
    pub max_chunks: Option<usize>,
}

/// A contiguous span of extracted text treated as one embedding unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Monotonic identifier assigned in extraction/split order.
    pub chunk_id: usize,
    /// 1-based page the chunk came from.
    pub page_no: u32,
    /// Non-empty chunk body.
    pub text: String,
}

/// Splits one page's text on the blank-line delimiter, dropping segments
/// that are empty after trimming. Pure and deterministic.
pub fn split_page(text: &str) -> Vec<&str> {
    text.split(CHUNK_DELIMITER)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Applies [`split_page`] to each page in order, assigning monotonic chunk
/// ids and honoring the configured document-wide cap.
pub fn collect_chunks(pages: &[ExtractedPage], config: &ChunkerConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    'pages: for page in pages {
        for segment in split_page(&page.text) {
            if let Some(cap) = config.max_chunks {
                if chunks.len() >= cap {
                    break 'pages;
                }
            }
            chunks.push(Chunk {
                chunk_id: chunks.len(),
                page_no: page.page_no,
                text: segment.to_string(),
            });
        }
    }
    chunks
}
