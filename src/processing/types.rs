//! Core data types and error definitions for the retrieval pipeline.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::{ErrorKind, ToolFault};

/// A bounded, contiguous slice of document text used as the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic identifier derived from document, ordinal, and content.
    pub id: String,
    /// Identifier of the owning document (the index cache key).
    pub document_id: String,
    /// Position of the chunk within the document, starting at 0.
    pub ordinal: usize,
    /// Chunk text; a contiguous substring of the extracted document text.
    pub text: String,
    /// Character offset of the chunk start within the document text.
    pub char_offset: usize,
}

impl Chunk {
    /// Build a chunk, deriving its stable identifier.
    pub fn new(document_id: &str, ordinal: usize, text: String, char_offset: usize) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(document_id.as_bytes());
        hasher.update(ordinal.to_le_bytes());
        hasher.update(text.as_bytes());
        let id = hex::encode(&hasher.finalize()[..8]);
        Self {
            id,
            document_id: document_id.to_string(),
            ordinal,
            text,
            char_offset,
        }
    }
}

/// Chunking parameters recorded in index manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkParams {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters.
    pub overlap: usize,
}

/// Manifest persisted alongside an index; a mismatch at load time forces a rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Identity of the embedder that produced the vectors.
    pub embedder_id: String,
    /// Chunking parameters the chunks were produced with.
    pub chunk_params: ChunkParams,
    /// Vector dimensionality.
    pub dim: usize,
}

/// A chunk returned from top-k retrieval together with its similarity score.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Inner-product similarity against the query vector.
    pub score: f32,
}

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// The overlap leaves no forward progress per window.
    #[error("chunk overlap must be smaller than chunk size")]
    InvalidParams,
}

impl ChunkingError {
    /// Convert into the wire-level fault payload.
    pub fn to_fault(&self) -> ToolFault {
        ToolFault::new(ErrorKind::BadInput, self.to_string())
    }
}

/// Errors raised while building, persisting, or loading an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Chunk and vector counts (or dimensions) disagree.
    #[error("index shape mismatch: {0}")]
    ShapeMismatch(String),
    /// Filesystem failure while persisting or loading.
    #[error("index I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Persisted files could not be decoded.
    #[error("index files corrupt: {0}")]
    Corrupt(String),
}

impl IndexError {
    /// Convert into the wire-level fault payload.
    pub fn to_fault(&self) -> ToolFault {
        ToolFault::new(ErrorKind::IndexUnavailable, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ids_are_deterministic_and_distinct() {
        let a = Chunk::new("doc", 0, "alpha".into(), 0);
        let b = Chunk::new("doc", 0, "alpha".into(), 0);
        let c = Chunk::new("doc", 1, "alpha".into(), 10);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn manifest_mismatch_is_detectable_by_equality() {
        let manifest = IndexManifest {
            embedder_id: "hash-v1".into(),
            chunk_params: ChunkParams {
                chunk_size: 1000,
                overlap: 200,
            },
            dim: 384,
        };
        let mut other = manifest.clone();
        assert_eq!(manifest, other);
        other.embedder_id = "hash-v2".into();
        assert_ne!(manifest, other);
    }
}
