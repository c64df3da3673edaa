#![warn(missing_docs)]
//! Core library entry points for the pdfvec ingestion pipeline.

pub mod chunker;
pub mod embedder;
pub mod embeddings;
pub mod extractor;
pub mod pipeline;
pub mod store;

pub use chunker::{Chunk, ChunkerConfig};
pub use embeddings::EmbeddedChunk;
pub use extractor::{ExtractError, ExtractedDocument, ExtractedPage, PdfExtractor};
pub use pipeline::{IngestConfig, IngestReport};
pub use store::{DistanceMetric, Neighbor, StoreConfig, TableName, VectorStore};

#[cfg(feature = "debug_logs")]
#[macro_export]
// This allows use of the `eprintln!` macro via `debug_log!` macro.
macro_rules! debug_log {
        ($($arg:tt)*) => {
            eprintln!($($arg)*);
        };
    }
#[cfg(not(feature = "debug_logs"))]
#[macro_export]
// This effectively disables the `eprintln!` macro, effectively removing it from the code during
// compilation.
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}
