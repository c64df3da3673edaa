//! Embedding client implementations.

pub mod ollama;
