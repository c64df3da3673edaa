//! Shared embedding data structures used across pipeline stages.

use serde::{Deserialize, Serialize};

use crate::chunker::Chunk;

/// Output row emitted by the embedding stage and consumed by the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    /// 1-based page the chunk came from.
    pub page_no: u32,
    /// Chunker-assigned chunk identifier.
    pub chunk_id: usize,
    /// Chunk body text submitted to the embedding model.
    pub text: String,
    /// Model embedding vector.
    pub embedding: Vec<f32>,
}

impl EmbeddedChunk {
    /// Pairs a chunk with its model vector.
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self {
            page_no: chunk.page_no,
            chunk_id: chunk.chunk_id,
            text: chunk.text,
            embedding,
        }
    }
}
