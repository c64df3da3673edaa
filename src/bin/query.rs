use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use pdfvec::embedder::ollama::OllamaEmbedder;
use pdfvec::store::{DistanceMetric, StoreConfig, TableName, VectorStore};
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(
    name = "pdfvec-query",
    about = "Embed a free-text query and print the nearest stored chunks"
)]
struct QueryCli {
    /// Text to search the stored chunks with
    #[arg(long)]
    query: String,

    /// Postgres connection string (postgres://...)
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Schema holding the vector table
    #[arg(long, env = "PDFVEC_SCHEMA", default_value = "public")]
    schema: String,

    /// Table storing document rows
    #[arg(long, env = "PDFVEC_TABLE", default_value = "documents")]
    table: String,

    /// Embedding column dimension; must match the model's output length
    #[arg(long, env = "PDFVEC_DIMENSIONS", default_value_t = 4096)]
    dimensions: usize,

    /// Distance metric used for ranking
    #[arg(long, env = "PDFVEC_METRIC", value_enum, default_value = "cosine")]
    metric: DistanceMetric,

    /// Ollama model used for the query embedding
    #[arg(long, env = "PDFVEC_OLLAMA_MODEL", default_value = "llama3")]
    model: String,

    /// Base URL of the Ollama server
    #[arg(
        long,
        env = "PDFVEC_OLLAMA_BASE",
        default_value = "http://127.0.0.1:11434"
    )]
    ollama_base_url: String,

    /// Max seconds to wait for the embedding request
    #[arg(long, env = "PDFVEC_OLLAMA_TIMEOUT_SECS", default_value_t = 120)]
    ollama_timeout_secs: u64,

    /// Number of retries for rate limits or transient errors
    #[arg(long, env = "PDFVEC_OLLAMA_MAX_RETRIES", default_value_t = 5)]
    max_retries: usize,

    /// Number of neighbors to print
    #[arg(long, default_value_t = 5)]
    top_k: usize,

    /// Seconds before any single database operation times out
    #[arg(long, env = "PDFVEC_DB_TIMEOUT_SECS", default_value_t = 30)]
    db_timeout_secs: u64,
}

fn main() -> Result<()> {
    let cli = QueryCli::parse();
    let table = TableName::new(cli.schema, cli.table)?;
    let embedder = OllamaEmbedder::new(
        cli.ollama_base_url,
        cli.model,
        Some(cli.dimensions),
        Duration::from_secs(cli.ollama_timeout_secs.max(1)),
        cli.max_retries.max(1),
        1,
    )?;
    let embedding = embedder
        .embed_batch(&[cli.query.as_str()])
        .context("embedding request failed")?
        .pop()
        .ok_or_else(|| anyhow!("embedding response was empty"))?;

    let store_config = StoreConfig {
        table,
        dimensions: cli.dimensions,
        metric: cli.metric,
        op_timeout: Duration::from_secs(cli.db_timeout_secs.max(1)),
    };
    let runtime = Runtime::new().context("failed to start async runtime")?;
    let neighbors = runtime.block_on(async {
        let store = VectorStore::connect(&cli.database_url, store_config).await?;
        store.nearest_to_vector(&embedding, cli.top_k.max(1)).await
    })?;

    if neighbors.is_empty() {
        println!("No rows matched; is the table populated?");
        return Ok(());
    }
    for neighbor in &neighbors {
        println!("{}\t{:.4}\t{}", neighbor.id, neighbor.distance, neighbor.content);
    }
    Ok(())
}
