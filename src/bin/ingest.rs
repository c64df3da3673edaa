use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use pdfvec::chunker::ChunkerConfig;
use pdfvec::embedder::ollama::OllamaEmbedder;
use pdfvec::pipeline::{run, IngestConfig};
use pdfvec::store::{DistanceMetric, StoreConfig, TableName};

#[derive(Parser, Debug)]
#[command(
    name = "pdfvec-ingest",
    about = "Extract a PDF into paragraph chunks and store their embeddings in pgvector"
)]
struct IngestCli {
    /// Path to the input PDF document
    input: PathBuf,

    /// Postgres connection string (postgres://...)
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Target schema for the vector table
    #[arg(long, env = "PDFVEC_SCHEMA", default_value = "public")]
    schema: String,

    /// Target table name inside the schema
    #[arg(long, env = "PDFVEC_TABLE", default_value = "documents")]
    table: String,

    /// Embedding column dimension; must match the model's output length
    #[arg(long, env = "PDFVEC_DIMENSIONS", default_value_t = 4096)]
    dimensions: usize,

    /// Distance metric used by the validation query
    #[arg(long, env = "PDFVEC_METRIC", value_enum, default_value = "cosine")]
    metric: DistanceMetric,

    /// Ollama model used for embeddings
    #[arg(long, env = "PDFVEC_OLLAMA_MODEL", default_value = "llama3")]
    model: String,

    /// Base URL of the Ollama server
    #[arg(
        long,
        env = "PDFVEC_OLLAMA_BASE",
        default_value = "http://127.0.0.1:11434"
    )]
    ollama_base_url: String,

    /// Max number of chunks to send per embedding request
    #[arg(long, env = "PDFVEC_OLLAMA_BATCH", default_value_t = 32)]
    batch_size: usize,

    /// Max seconds to wait for each embedding request
    #[arg(long, env = "PDFVEC_OLLAMA_TIMEOUT_SECS", default_value_t = 120)]
    ollama_timeout_secs: u64,

    /// Number of retries for rate limits or transient errors
    #[arg(long, env = "PDFVEC_OLLAMA_MAX_RETRIES", default_value_t = 5)]
    max_retries: usize,

    /// Only embed and store the first N chunks (0 = whole document)
    #[arg(long, env = "PDFVEC_MAX_CHUNKS", default_value_t = 0)]
    max_chunks: usize,

    /// Drop and recreate the table before inserting (destructive)
    #[arg(long, default_value_t = false)]
    reset_table: bool,

    /// Neighbors fetched by the validation query (0 disables it)
    #[arg(long, default_value_t = 5)]
    top_k: usize,

    /// Seconds before any single database operation times out
    #[arg(long, env = "PDFVEC_DB_TIMEOUT_SECS", default_value_t = 30)]
    db_timeout_secs: u64,
}

fn main() -> Result<()> {
    let cli = IngestCli::parse();
    let table = TableName::new(cli.schema, cli.table)?;
    let embedder = OllamaEmbedder::new(
        cli.ollama_base_url,
        cli.model,
        Some(cli.dimensions),
        Duration::from_secs(cli.ollama_timeout_secs.max(1)),
        cli.max_retries.max(1),
        cli.batch_size.max(1),
    )?;
    let config = IngestConfig {
        input: cli.input,
        database_url: cli.database_url,
        store: StoreConfig {
            table,
            dimensions: cli.dimensions,
            metric: cli.metric,
            op_timeout: Duration::from_secs(cli.db_timeout_secs.max(1)),
        },
        chunker: ChunkerConfig {
            max_chunks: (cli.max_chunks > 0).then_some(cli.max_chunks),
        },
        reset_table: cli.reset_table,
        top_k: cli.top_k,
    };

    let report = run(&config, &embedder)?;
    println!(
        "Ingested {} chunks from {} pages ({} pages skipped); {} rows stored.",
        report.chunks,
        report.pages_total - report.pages_skipped,
        report.pages_skipped,
        report.inserted
    );
    if let Some(reference_id) = report.reference_id {
        println!("Nearest neighbors of row {}:", reference_id);
        for neighbor in &report.neighbors {
            println!(
                "{}\t{:.4}\t{}",
                neighbor.id,
                neighbor.distance,
                preview(&neighbor.content)
            );
        }
    }
    Ok(())
}

fn preview(content: &str) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut preview: String = collapsed.chars().take(160).collect();
    if preview.len() < collapsed.len() {
        preview.push_str("...");
    }
    preview
}
