//! Embedding provider capability and vector helpers.
//!
//! [`EmbeddingProvider`] is the seam between the vector index and whatever
//! turns text into vectors. Concrete backends (feature hashing, OpenAI,
//! Ollama, fastembed) live in the `mech-catalog` crate and are chosen by
//! configuration.

use async_trait::async_trait;
use thiserror::Error;

/// Failures raised by embedding backends.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("embedding provider is disabled; set [embedding] provider in config")]
    Disabled,
    #[error("embedding request was cancelled")]
    Cancelled,
    #[error("{provider} returned a {actual}-dimensional vector, expected {expected}")]
    DimensionMismatch {
        provider: String,
        expected: usize,
        actual: usize,
    },
    #[error("{provider} returned {actual} embeddings for {expected} inputs")]
    CountMismatch {
        provider: String,
        expected: usize,
        actual: usize,
    },
    #[error("{provider} request failed: {message}")]
    Request { provider: String, message: String },
}

impl ProviderError {
    pub fn request(provider: &str, message: impl Into<String>) -> Self {
        Self::Request {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// Converts text into fixed-length vectors.
///
/// `embed_batch` must preserve input order. Backends without a native batch
/// endpoint report `supports_batch() == false` and inherit the default
/// one-call-per-text implementation.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Backend/model label, e.g. `"openai:text-embedding-3-small"`.
    fn name(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimensions(&self) -> usize;

    fn supports_batch(&self) -> bool {
        false
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Check a provider response against the expected count and dimension.
pub fn check_vectors(
    provider: &str,
    expected_count: usize,
    dims: usize,
    vectors: &[Vec<f32>],
) -> Result<(), ProviderError> {
    if vectors.len() != expected_count {
        return Err(ProviderError::CountMismatch {
            provider: provider.to_string(),
            expected: expected_count,
            actual: vectors.len(),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(ProviderError::DimensionMismatch {
            provider: provider.to_string(),
            expected: dims,
            actual: bad.len(),
        });
    }
    Ok(())
}

/// Encode a vector as little-endian `f32` bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian `f32` bytes; a trailing partial value is ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty, mismatched, or
/// zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let denom = l2_norm(a) * l2_norm(b);
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
