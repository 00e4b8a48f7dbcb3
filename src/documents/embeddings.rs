//! Embedding Gateway
//!
//! Wraps the text-embedding capability behind the `Embedder` trait. Every
//! backend produces vectors of `EMBEDDING_DIM` floats; anything else is
//! reported as a failure so it can never reach an index.
//!
//! Two backends ship here: a local feature-hashing embedder (stable, no
//! network, used by default and in tests) and an HTTP client for
//! OpenAI-compatible `/embeddings` endpoints.

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{EmbeddingBackend, EmbeddingConfig};

/// Dimensionality of every embedding vector in the corpus.
pub const EMBEDDING_DIM: usize = 384;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding generation failed: {0}")]
    GenerationFailed(String),
    #[error("Embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Embedding endpoint error: {0}")]
    Http(String),
    #[error("Embedding backend misconfigured: {0}")]
    Config(String),
}

impl Serialize for EmbeddingError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(e: reqwest::Error) -> Self {
        EmbeddingError::Http(e.to_string())
    }
}

/// Embedding vector
pub type Embedding = Vec<f32>;

/// Text embedding capability
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;
}

/// Reject vectors of the wrong length.
pub fn check_dimension(embedding: &Embedding) -> Result<(), EmbeddingError> {
    if embedding.len() != EMBEDDING_DIM {
        return Err(EmbeddingError::DimensionMismatch {
            expected: EMBEDDING_DIM,
            actual: embedding.len(),
        });
    }
    Ok(())
}

/// Build the configured backend.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match config.backend {
        EmbeddingBackend::Hashing => Ok(Arc::new(HashingEmbedder)),
        EmbeddingBackend::Http => {
            let api_key = config.api_key().unwrap_or_default();
            Ok(Arc::new(HttpEmbedder::new(
                &config.base_url,
                &config.model,
                &api_key,
                Duration::from_secs(config.timeout_secs),
                config.max_retries,
            )?))
        }
    }
}

// ============ Feature hashing ============

/// Local embedder using the hashing trick. The same text always produces
/// the same vector regardless of what else has been embedded.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashingEmbedder;

/// Hash a token to a bucket index in `[0, EMBEDDING_DIM)`.
fn hash_token(token: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % EMBEDDING_DIM
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let mut tf = vec![0.0f32; EMBEDDING_DIM];

        let tokens = text
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|t| !t.is_empty());
        for token in tokens {
            tf[hash_token(&token.to_lowercase())] += 1.0;
        }

        // L2 normalize
        let norm: f32 = tf.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut tf {
                *x /= norm;
            }
        }

        Ok(tf)
    }
}

// ============ HTTP backend ============

/// Blocking client for OpenAI-compatible embedding endpoints.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    max_retries: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self, EmbeddingError> {
        if model.trim().is_empty() {
            return Err(EmbeddingError::Config("missing embedding model name".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !api_key.trim().is_empty() {
            let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
                .map_err(|_| EmbeddingError::Config("invalid API key".to_string()))?;
            headers.insert(AUTHORIZATION, auth);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            max_retries: max_retries.max(1),
        })
    }

    fn should_retry(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    fn retry_backoff(attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        Duration::from_millis(250 * (1 << capped))
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: [text],
        };

        let mut attempt = 0usize;
        loop {
            let result = self.client.post(&self.endpoint).json(&request).send();
            let resp = match result {
                Ok(resp) => resp,
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt + 1 < self.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "Embedding request failed, retrying");
                    thread::sleep(Self::retry_backoff(attempt));
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = resp.status();
            if status.is_success() {
                let parsed: EmbeddingResponse = resp.json()?;
                let embedding = parsed
                    .data
                    .into_iter()
                    .next()
                    .map(|d| d.embedding)
                    .ok_or_else(|| EmbeddingError::GenerationFailed("empty embedding response".to_string()))?;
                check_dimension(&embedding)?;
                debug!(model = %self.model, "Embedded text via HTTP");
                return Ok(embedding);
            }

            if Self::should_retry(status) && attempt + 1 < self.max_retries {
                attempt += 1;
                warn!(attempt, status = %status, "Embedding endpoint busy, retrying");
                thread::sleep(Self::retry_backoff(attempt));
                continue;
            }

            let body = resp.text().unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbeddingError::Http(format!("request failed ({}): {}", status, body)));
        }
    }
}

// ============ Similarity ============

/// Calculate cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_dimension() {
        let embedding = HashingEmbedder.embed("What is the unit of force?").unwrap();
        assert_eq!(embedding.len(), EMBEDDING_DIM);
        assert!(check_dimension(&embedding).is_ok());
    }

    #[test]
    fn test_hashing_stability() {
        let emb1 = HashingEmbedder.embed("The quick brown fox").unwrap();
        let _ = HashingEmbedder.embed("completely different words zebra giraffe quantum");
        let emb2 = HashingEmbedder.embed("The quick brown fox").unwrap();
        assert_eq!(emb1, emb2);
    }

    #[test]
    fn test_hashing_empty_text_is_zero_vector() {
        let embedding = HashingEmbedder.embed("   ").unwrap();
        assert!(embedding.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_dimension_check() {
        let err = check_dimension(&vec![0.0; 3]).unwrap_err();
        assert!(matches!(err, EmbeddingError::DimensionMismatch { expected: 384, actual: 3 }));
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_http_embedder_requires_model() {
        let result = HttpEmbedder::new("http://localhost:1", " ", "", Duration::from_secs(1), 1);
        assert!(matches!(result, Err(EmbeddingError::Config(_))));
    }

    #[test]
    fn test_http_embedder_unreachable_is_error() {
        let embedder = HttpEmbedder::new("http://127.0.0.1:9", "m", "", Duration::from_millis(200), 1).unwrap();
        assert!(embedder.embed("text").is_err());
    }
}
