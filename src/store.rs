//! pgvector-backed storage gateway for embedded chunks.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use pgvector::Vector;
use tokio::time::timeout;
use tokio_postgres::{Client, NoTls, Row};

use crate::embeddings::EmbeddedChunk;

/// Fully-qualified Postgres table name (schema + table).
#[derive(Debug, Clone)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    /// Builds a new table identifier.
    pub fn new<S, T>(schema: S, table: T) -> Result<Self>
    where
        S: Into<String>,
        T: Into<String>,
    {
        let schema = schema.into();
        let table = table.into();
        anyhow::ensure!(!schema.trim().is_empty(), "schema name is required");
        anyhow::ensure!(!table.trim().is_empty(), "table name is required");
        Ok(Self { schema, table })
    }

    /// Fully-qualified table reference with quoted identifiers.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    /// Returns the raw schema string.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Returns the raw table string.
    pub fn table(&self) -> &str {
        &self.table
    }
}

/// Quotes Postgres identifiers, escaping embedded quotes.
pub fn quote_ident(input: &str) -> String {
    let escaped = input.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Distance metrics supported by pgvector.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum DistanceMetric {
    /// Cosine distance (`<=>`).
    Cosine,
    /// Euclidean distance (`<->`).
    L2,
    /// Negative inner product (`<#>`).
    InnerProduct,
}

impl DistanceMetric {
    /// pgvector operator implementing this metric.
    pub fn operator(self) -> &'static str {
        match self {
            Self::Cosine => "<=>",
            Self::L2 => "<->",
            Self::InnerProduct => "<#>",
        }
    }
}

/// Row returned by nearest-neighbor queries, ascending distance.
#[derive(Debug, Clone)]
pub struct Neighbor {
    /// Row id of the neighbor.
    pub id: i64,
    /// Stored chunk text.
    pub content: String,
    /// Distance from the reference under the configured metric.
    pub distance: f64,
}

/// Gateway configuration fixed for the duration of a run.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Target table for document rows.
    pub table: TableName,
    /// Vector column dimension; every inserted embedding must match.
    pub dimensions: usize,
    /// Distance metric used by neighbor queries.
    pub metric: DistanceMetric,
    /// Deadline applied to each database operation.
    pub op_timeout: Duration,
}

/// Postgres + pgvector gateway owning the run's database connection.
pub struct VectorStore {
    client: Client,
    config: StoreConfig,
}

impl VectorStore {
    /// Connects to Postgres and spawns the connection driver task.
    ///
    /// The connection is owned exclusively for the run and closed when the
    /// store drops, on success and error paths alike.
    pub async fn connect(database_url: &str, config: StoreConfig) -> Result<Self> {
        anyhow::ensure!(config.dimensions > 0, "embedding dimension must be positive");
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .context("failed to connect to Postgres")?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                eprintln!("postgres connection error: {err}");
            }
        });
        Ok(Self { client, config })
    }

    /// Gateway configuration in effect.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Idempotently enables the pgvector extension.
    pub async fn ensure_extension(&self) -> Result<()> {
        self.execute("CREATE EXTENSION IF NOT EXISTS vector", "ensure pgvector extension")
            .await?;
        Ok(())
    }

    /// Creates the document table when missing.
    pub async fn ensure_table(&self) -> Result<()> {
        let ddl = create_table_sql(&self.config.table, self.config.dimensions);
        self.execute(&ddl, "create document table").await?;
        Ok(())
    }

    /// Drops and recreates the document table.
    ///
    /// Destructive: every existing row in the table is lost. Callers must
    /// only reach this behind an explicit opt-in.
    pub async fn reset_table(&self) -> Result<()> {
        let drop = format!("DROP TABLE IF EXISTS {}", self.config.table.qualified());
        self.execute(&drop, "drop document table").await?;
        self.ensure_table().await
    }

    /// Inserts all records within a single transaction and returns their row
    /// ids in insert order.
    ///
    /// Every vector is validated against the configured dimension before any
    /// SQL is issued; a failure mid-batch rolls the whole batch back.
    pub async fn insert_chunks(&mut self, records: &[EmbeddedChunk]) -> Result<Vec<i64>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        validate_dimensions(records, self.config.dimensions)?;

        let sql = insert_sql(&self.config.table);
        let deadline = self.config.op_timeout;
        let client = &mut self.client;
        let insert_all = async {
            let transaction = client
                .transaction()
                .await
                .context("failed to begin insert transaction")?;
            let statement = transaction
                .prepare(&sql)
                .await
                .context("failed to prepare insert")?;
            let mut ids = Vec::with_capacity(records.len());
            for (index, record) in records.iter().enumerate() {
                let vector = Vector::from(record.embedding.clone());
                let row = transaction
                    .query_one(&statement, &[&record.text, &vector])
                    .await
                    .with_context(|| {
                        format!("failed to insert row {} (chunk {})", index, record.chunk_id)
                    })?;
                ids.push(row.try_get(0).context("insert returned no id")?);
            }
            transaction
                .commit()
                .await
                .context("failed to commit insert transaction")?;
            Ok::<Vec<i64>, anyhow::Error>(ids)
        };
        match timeout(deadline, insert_all).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "insert of {} rows timed out after {:?}",
                records.len(),
                deadline
            )),
        }
    }

    /// Returns the `k` nearest rows to the row `id`, excluding the row
    /// itself, ordered by ascending distance.
    pub async fn nearest_to_row(&self, id: i64, k: usize) -> Result<Vec<Neighbor>> {
        let reference_sql = select_reference_sql(&self.config.table);
        let reference = self
            .deadline(
                self.client.query_opt(&reference_sql, &[&id]),
                "load reference row",
            )
            .await?
            .ok_or_else(|| {
                anyhow!(
                    "reference row {} not found in {}",
                    id,
                    self.config.table.qualified()
                )
            })?;
        let embedding: Vector = reference
            .try_get("embedding")
            .context("reference row has no embedding")?;

        let sql = neighbors_excluding_sql(&self.config.table, self.config.metric);
        let rows = self
            .deadline(
                self.client.query(&sql, &[&embedding, &id, &(k as i64)]),
                "query nearest neighbors",
            )
            .await?;
        rows.iter().map(neighbor_from_row).collect()
    }

    /// Returns the `k` nearest rows to an arbitrary query vector, ordered by
    /// ascending distance.
    pub async fn nearest_to_vector(&self, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        anyhow::ensure!(
            embedding.len() == self.config.dimensions,
            "query embedding has length {}, expected {}",
            embedding.len(),
            self.config.dimensions
        );
        let vector = Vector::from(embedding.to_vec());
        let sql = neighbors_sql(&self.config.table, self.config.metric);
        let rows = self
            .deadline(
                self.client.query(&sql, &[&vector, &(k as i64)]),
                "query nearest neighbors",
            )
            .await?;
        rows.iter().map(neighbor_from_row).collect()
    }

    async fn execute(&self, sql: &str, what: &str) -> Result<u64> {
        self.deadline(self.client.execute(sql, &[]), what).await
    }

    async fn deadline<T, F>(&self, fut: F, what: &str) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, tokio_postgres::Error>>,
    {
        match timeout(self.config.op_timeout, fut).await {
            Ok(result) => result.with_context(|| format!("failed to {what}")),
            Err(_) => Err(anyhow!(
                "{} timed out after {:?}",
                what,
                self.config.op_timeout
            )),
        }
    }
}

fn neighbor_from_row(row: &Row) -> Result<Neighbor> {
    Ok(Neighbor {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        distance: row.try_get("distance")?,
    })
}

/// Verifies every record's vector matches the configured column dimension.
pub fn validate_dimensions(records: &[EmbeddedChunk], dimensions: usize) -> Result<()> {
    for (index, record) in records.iter().enumerate() {
        anyhow::ensure!(
            record.embedding.len() == dimensions,
            "row {} (chunk {}) has embedding length {}, expected {}",
            index,
            record.chunk_id,
            record.embedding.len(),
            dimensions
        );
    }
    Ok(())
}

fn create_table_sql(table: &TableName, dimensions: usize) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id bigserial PRIMARY KEY,
            content text NOT NULL,
            embedding vector({}) NOT NULL
        )",
        table.qualified(),
        dimensions
    )
}

fn insert_sql(table: &TableName) -> String {
    format!(
        "INSERT INTO {} (content, embedding) VALUES ($1, $2) RETURNING id",
        table.qualified()
    )
}

fn select_reference_sql(table: &TableName) -> String {
    format!("SELECT embedding FROM {} WHERE id = $1", table.qualified())
}

fn neighbors_sql(table: &TableName, metric: DistanceMetric) -> String {
    format!(
        "SELECT id, content, embedding {op} $1 AS distance \
         FROM {table} \
         ORDER BY distance ASC \
         LIMIT $2",
        op = metric.operator(),
        table = table.qualified()
    )
}

fn neighbors_excluding_sql(table: &TableName, metric: DistanceMetric) -> String {
    format!(
        "SELECT id, content, embedding {op} $1 AS distance \
         FROM {table} \
         WHERE id != $2 \
         ORDER BY distance ASC \
         LIMIT $3",
        op = metric.operator(),
        table = table.qualified()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(chunk_id: usize, len: usize) -> EmbeddedChunk {
        EmbeddedChunk {
            page_no: 1,
            chunk_id,
            text: format!("chunk {chunk_id}"),
            embedding: vec![0.0; len],
        }
    }

    #[test]
    fn table_names_are_quoted() {
        let table = TableName::new("public", "documents").expect("table name");
        assert_eq!(table.qualified(), "\"public\".\"documents\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn blank_table_name_rejected() {
        assert!(TableName::new("public", "  ").is_err());
        assert!(TableName::new("", "documents").is_err());
    }

    #[test]
    fn metric_operators() {
        assert_eq!(DistanceMetric::Cosine.operator(), "<=>");
        assert_eq!(DistanceMetric::L2.operator(), "<->");
        assert_eq!(DistanceMetric::InnerProduct.operator(), "<#>");
    }

    #[test]
    fn create_table_pins_dimension() {
        let table = TableName::new("public", "documents").expect("table name");
        let ddl = create_table_sql(&table, 4096);
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS"));
        assert!(ddl.contains("embedding vector(4096) NOT NULL"));
    }

    #[test]
    fn neighbor_query_excludes_reference_row() {
        let table = TableName::new("public", "documents").expect("table name");
        let sql = neighbors_excluding_sql(&table, DistanceMetric::Cosine);
        assert!(sql.contains("embedding <=> $1 AS distance"));
        assert!(sql.contains("WHERE id != $2"));
        assert!(sql.contains("ORDER BY distance ASC"));
    }

    #[test]
    fn mismatched_dimension_is_rejected_with_row_context() {
        let records = [record(0, 4), record(1, 3)];
        let err = validate_dimensions(&records, 4).expect_err("dimension mismatch");
        let message = err.to_string();
        assert!(message.contains("row 1"));
        assert!(message.contains("length 3, expected 4"));
    }

    #[test]
    fn matching_dimensions_pass() {
        let records = [record(0, 4), record(1, 4)];
        assert!(validate_dimensions(&records, 4).is_ok());
    }
}
