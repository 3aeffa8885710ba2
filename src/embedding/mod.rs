//! Embedding client abstraction and the deterministic default embedder.
//!
//! The pipeline only depends on the [`EmbeddingClient`] trait: a batch of chunk texts
//! in, one L2-normalized vector per chunk out. The embedder's identity is recorded in
//! every index manifest so a model change invalidates cached indexes instead of mixing
//! incompatible vector spaces.

use crate::config::get_config;
use async_trait::async_trait;
use thiserror::Error;

use crate::error::{ErrorKind, ToolFault};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Length of the byte shingles hashed into vector features.
const SHINGLE_LEN: usize = 3;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
}

impl EmbeddingClientError {
    /// Convert into the wire-level fault payload.
    pub fn to_fault(&self) -> ToolFault {
        ToolFault::new(ErrorKind::EmbedFailed, self.to_string())
    }
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Stable identifier recorded in index manifests; changing it invalidates caches.
    fn embedder_id(&self) -> String;

    /// Dimensionality of the produced vectors.
    fn dimension(&self) -> usize;

    /// Produce a normalized embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Deterministic stand-in embedder using signed feature hashing.
///
/// Each overlapping byte shingle of the input is FNV-1a hashed; the hash selects both
/// a vector slot and a ±1 contribution, and the accumulated vector is L2-normalized.
/// The hash state is seeded from the embedder id, so two differently-named embedders
/// produce unrelated vector spaces and cached indexes cannot be mixed between them.
/// Purely a function of its inputs, which makes index builds reproducible and lets
/// tests assert on exact retrieval behavior.
pub struct HashEmbedder {
    model_id: String,
    dimension: usize,
    seed: u64,
}

impl HashEmbedder {
    /// Construct an embedder with an explicit identity and dimension.
    pub fn new(model_id: impl Into<String>, dimension: usize) -> Self {
        let model_id = model_id.into();
        let seed = fnv1a(FNV_OFFSET, model_id.as_bytes());
        Self {
            model_id,
            dimension,
            seed,
        }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];
        let bytes = text.as_bytes();
        if bytes.is_empty() {
            return embedding;
        }

        for start in 0..bytes.len() {
            let end = (start + SHINGLE_LEN).min(bytes.len());
            let hash = fnv1a(self.seed, &bytes[start..end]);
            let slot = (hash % self.dimension as u64) as usize;
            // Top hash bit decides the sign so features interfere instead of only
            // accumulating, which keeps long repetitive inputs from saturating slots.
            let contribution = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[slot] += contribution;
        }

        let norm = embedding.iter().fold(0.0_f32, |acc, v| acc + v * v).sqrt();
        if norm > f32::EPSILON {
            embedding.iter_mut().for_each(|v| *v /= norm);
        }
        embedding
    }
}

fn fnv1a(mut state: u64, bytes: &[u8]) -> u64 {
    for &byte in bytes {
        state ^= u64::from(byte);
        state = state.wrapping_mul(FNV_PRIME);
    }
    state
}

#[async_trait]
impl EmbeddingClient for HashEmbedder {
    fn embedder_id(&self) -> String {
        self.model_id.clone()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        tracing::debug!(
            model = %self.model_id,
            dimension = self.dimension,
            batch = texts.len(),
            "Generating embeddings"
        );

        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}

/// Build an embedding client suitable for the current configuration.
pub fn get_embedding_client() -> Box<dyn EmbeddingClient + Send + Sync> {
    let config = get_config();
    Box::new(HashEmbedder::new(
        config.embedding_model_id.clone(),
        config.embedding_dimension,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vectors_are_normalized_and_deterministic() {
        let embedder = HashEmbedder::new("hash-test", 32);
        let first = embedder
            .generate_embeddings(vec!["The capital of Freedonia".into()])
            .await
            .expect("embeddings");
        let second = embedder
            .generate_embeddings(vec!["The capital of Freedonia".into()])
            .await
            .expect("embeddings");
        assert_eq!(first, second);

        let norm: f32 = first[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn batch_is_parallel_to_input() {
        let embedder = HashEmbedder::new("hash-test", 16);
        let vectors = embedder
            .generate_embeddings(vec![
                "the quick brown fox jumps over the lazy dog".into(),
                "shipping manifests for the port of Fredonia City".into(),
                "quarterly revenue grew in both reporting segments".into(),
            ])
            .await
            .expect("embeddings");
        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 16));
        assert_ne!(vectors[0], vectors[1]);
        assert_ne!(vectors[1], vectors[2]);
    }

    #[tokio::test]
    async fn embedder_identity_seeds_the_vector_space() {
        let text = "the same input text".to_string();
        let first = HashEmbedder::new("hash-v1", 32)
            .generate_embeddings(vec![text.clone()])
            .await
            .expect("embeddings");
        let second = HashEmbedder::new("hash-v2", 32)
            .generate_embeddings(vec![text])
            .await
            .expect("embeddings");
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let embedder = HashEmbedder::new("hash-test", 16);
        let error = embedder.generate_embeddings(Vec::new()).await.unwrap_err();
        assert_eq!(error.to_fault().kind, ErrorKind::EmbedFailed);
    }
}
