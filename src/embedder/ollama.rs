//! Ollama-based embedding client implementation.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Blocking embeddings client that talks to an Ollama server.
#[derive(Clone)]
pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    max_retries: usize,
    batch_size: usize,
}

impl OllamaEmbedder {
    /// Builds a new Ollama embeddings client.
    pub fn new(
        base_url: String,
        model: String,
        dimensions: Option<usize>,
        timeout: Duration,
        max_retries: usize,
        batch_size: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!base_url.trim().is_empty(), "missing Ollama base URL");
        anyhow::ensure!(!model.trim().is_empty(), "missing Ollama model name");
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Ollama HTTP client")?;
        let endpoint = format!("{}/api/embed", base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model,
            dimensions,
            max_retries,
            batch_size,
        })
    }

    /// Maximum batch size configured for this client.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Sends one bounded batch to Ollama and returns embedding vectors.
    ///
    /// Ollama answers positionally, so `embeddings[i]` corresponds to
    /// `inputs[i]`. When a dimension is configured every returned vector is
    /// checked against it before the batch is accepted.
    pub fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        anyhow::ensure!(
            inputs.len() <= self.batch_size,
            "batch of {} exceeds configured max {}",
            inputs.len(),
            self.batch_size
        );

        let mut attempt = 0usize;
        loop {
            let request = EmbedRequest {
                model: &self.model,
                input: inputs,
            };
            let response = self.client.post(&self.endpoint).json(&request).send();
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: EmbedResponse = resp
                            .json()
                            .context("failed to parse Ollama embedding response")?;
                        anyhow::ensure!(
                            parsed.embeddings.len() == inputs.len(),
                            "Ollama returned {} embeddings for {} inputs",
                            parsed.embeddings.len(),
                            inputs.len()
                        );
                        if let Some(dims) = self.dimensions {
                            for (index, vector) in parsed.embeddings.iter().enumerate() {
                                anyhow::ensure!(
                                    vector.len() == dims,
                                    "embedding {} has length {}, expected {}",
                                    index,
                                    vector.len(),
                                    dims
                                );
                            }
                        }
                        return Ok(parsed.embeddings);
                    }

                    let body = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if self.should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        thread::sleep(self.retry_backoff(attempt));
                        continue;
                    }
                    anyhow::bail!("Ollama embeddings request failed ({}): {}", status, body);
                }
                Err(err) => {
                    if self.is_retryable_error(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        thread::sleep(self.retry_backoff(attempt));
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }

    /// Embeds an arbitrary number of inputs by driving sequential bounded
    /// batches, preserving input order across batch boundaries.
    pub fn embed_all(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.batch_size) {
            embeddings.extend(self.embed_batch(batch)?);
        }
        Ok(embeddings)
    }

    fn should_retry(&self, status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    fn is_retryable_error(&self, err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect() || err.is_body() || err.is_request() || err.is_decode()
    }

    fn retry_backoff(&self, attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        Duration::from_millis(500 * (1 << capped))
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    #[serde(borrow)]
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder(batch_size: usize) -> OllamaEmbedder {
        OllamaEmbedder::new(
            "http://127.0.0.1:11434".to_string(),
            "llama3".to_string(),
            Some(4),
            Duration::from_secs(1),
            1,
            batch_size,
        )
        .expect("build embedder")
    }

    #[test]
    fn empty_batch_short_circuits() {
        let embeddings = embedder(8).embed_batch(&[]).expect("empty batch");
        assert!(embeddings.is_empty());
    }

    #[test]
    fn oversize_batch_rejected_before_any_request() {
        let err = embedder(2)
            .embed_batch(&["a", "b", "c"])
            .expect_err("oversize batch");
        assert!(err.to_string().contains("exceeds configured max 2"));
    }

    #[test]
    fn blank_model_rejected() {
        let err = OllamaEmbedder::new(
            "http://127.0.0.1:11434".to_string(),
            "  ".to_string(),
            None,
            Duration::from_secs(1),
            1,
            8,
        )
        .expect_err("blank model");
        assert!(err.to_string().contains("missing Ollama model name"));
    }

    #[test]
    fn request_payload_shape() {
        let request = EmbedRequest {
            model: "llama3",
            input: &["Hello world", "Goodbye"],
        };
        let json = serde_json::to_value(&request).expect("serialize request");
        assert_eq!(json["model"], "llama3");
        assert_eq!(json["input"][1], "Goodbye");
    }
}
