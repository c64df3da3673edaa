//! Linear ingestion sequence wiring extractor, chunker, embedder and store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;

use crate::chunker::{collect_chunks, Chunk, ChunkerConfig};
use crate::embedder::ollama::OllamaEmbedder;
use crate::embeddings::EmbeddedChunk;
use crate::extractor::PdfExtractor;
use crate::store::{Neighbor, StoreConfig, VectorStore};

/// Everything an ingest run needs, resolved before the pipeline starts.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Path to the input PDF document.
    pub input: PathBuf,
    /// Postgres connection string.
    pub database_url: String,
    /// Vector store settings.
    pub store: StoreConfig,
    /// Chunking settings.
    pub chunker: ChunkerConfig,
    /// Drop and recreate the table before inserting (destructive).
    pub reset_table: bool,
    /// Neighbors fetched by the validation query; 0 disables it.
    pub top_k: usize,
}

/// Counters and validation output describing a completed run.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Pages the document reported.
    pub pages_total: usize,
    /// Pages that failed to extract and were skipped.
    pub pages_skipped: usize,
    /// Chunks retained after splitting and filtering.
    pub chunks: usize,
    /// Embedding vectors received.
    pub embedded: usize,
    /// Rows written to the store.
    pub inserted: usize,
    /// Row id the validation query was keyed off, when one ran.
    pub reference_id: Option<i64>,
    /// Validation query output, ascending distance.
    pub neighbors: Vec<Neighbor>,
}

/// Runs the pipeline end to end: extract, chunk, embed, store, validate.
///
/// A document that yields zero chunks short-circuits before any embedding
/// request or database connection is made.
pub fn run(config: &IngestConfig, embedder: &OllamaEmbedder) -> Result<IngestReport> {
    let extractor = PdfExtractor::open(&config.input)
        .with_context(|| format!("failed to read {}", config.input.display()))?;
    let document = extractor.extract_pages();
    for skipped in &document.skipped {
        eprintln!(
            "page {} failed to extract: {}; skipping.",
            skipped.page_no, skipped.reason
        );
    }

    let chunks = collect_chunks(&document.pages, &config.chunker);
    eprintln!(
        "split {} of {} pages into {} chunks.",
        document.pages.len(),
        document.pages_total,
        chunks.len()
    );
    #[cfg(feature = "debug_logs")]
    for chunk in &chunks {
        crate::debug_log!(
            "---------Chunk {} (page {})---------\n{}",
            chunk.chunk_id,
            chunk.page_no,
            chunk.text
        );
    }

    let mut report = IngestReport {
        pages_total: document.pages_total,
        pages_skipped: document.skipped.len(),
        chunks: chunks.len(),
        ..IngestReport::default()
    };
    if chunks.is_empty() {
        eprintln!("no chunks to embed; skipping embedding and storage.");
        return Ok(report);
    }

    let records = embed_chunks(embedder, chunks)?;
    report.embedded = records.len();
    eprintln!("embedded {} chunks.", report.embedded);

    let runtime = Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(store_and_validate(config, &records, &mut report))?;
    Ok(report)
}

/// Embeds chunks in bounded sequential batches, preserving chunk order.
fn embed_chunks(embedder: &OllamaEmbedder, chunks: Vec<Chunk>) -> Result<Vec<EmbeddedChunk>> {
    let inputs: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
    let embeddings = embedder
        .embed_all(&inputs)
        .context("embedding request failed")?;
    anyhow::ensure!(
        embeddings.len() == chunks.len(),
        "embedding count {} mismatched chunk count {}",
        embeddings.len(),
        chunks.len()
    );
    Ok(chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| EmbeddedChunk::new(chunk, embedding))
        .collect())
}

async fn store_and_validate(
    config: &IngestConfig,
    records: &[EmbeddedChunk],
    report: &mut IngestReport,
) -> Result<()> {
    let mut store = VectorStore::connect(&config.database_url, config.store.clone()).await?;
    store.ensure_extension().await?;
    if config.reset_table {
        eprintln!(
            "resetting {}; existing rows are dropped.",
            config.store.table.qualified()
        );
        store.reset_table().await?;
    } else {
        store.ensure_table().await?;
    }

    let ids = store.insert_chunks(records).await?;
    report.inserted = ids.len();
    eprintln!(
        "inserted {} rows into {}.",
        report.inserted,
        config.store.table.qualified()
    );

    if config.top_k > 0 {
        if let Some(&reference_id) = ids.first() {
            report.reference_id = Some(reference_id);
            report.neighbors = store.nearest_to_row(reference_id, config.top_k).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DistanceMetric, StoreConfig, TableName};
    use lopdf::content::Content;
    use lopdf::{dictionary, Document, Object, Stream};
    use std::time::Duration;

    fn write_blank_page_pdf(path: &std::path::Path) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content = Content { operations: vec![] };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).expect("save pdf");
    }

    #[test]
    fn zero_chunk_document_skips_embedding_and_storage() {
        let mut path = std::env::temp_dir();
        path.push(format!("pdfvec-{}-blank.pdf", std::process::id()));
        write_blank_page_pdf(&path);

        // Both endpoints are unreachable; the run must succeed without
        // touching either.
        let embedder = OllamaEmbedder::new(
            "http://127.0.0.1:1".to_string(),
            "llama3".to_string(),
            Some(4),
            Duration::from_millis(10),
            1,
            8,
        )
        .expect("build embedder");
        let config = IngestConfig {
            input: path.clone(),
            database_url: "postgres://unused@127.0.0.1:1/unused".to_string(),
            store: StoreConfig {
                table: TableName::new("public", "documents").expect("table name"),
                dimensions: 4,
                metric: DistanceMetric::Cosine,
                op_timeout: Duration::from_millis(10),
            },
            chunker: ChunkerConfig::default(),
            reset_table: false,
            top_k: 5,
        };

        let report = run(&config, &embedder).expect("pipeline run");
        assert_eq!(report.chunks, 0);
        assert_eq!(report.embedded, 0);
        assert_eq!(report.inserted, 0);
        assert!(report.neighbors.is_empty());

        let _ = std::fs::remove_file(&path);
    }
}
