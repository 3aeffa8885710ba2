//! Retrieval pipeline: chunking, vector index, document registry, and the service
//! coordinating them.

pub mod chunking;
pub mod registry;
pub mod service;
pub mod store;
pub mod types;

pub use chunking::chunk_text;
pub use registry::DocumentRegistry;
pub use service::{RetrievalService, build_grounded_prompt};
pub use store::DocumentIndex;
pub use types::{Chunk, ChunkParams, ChunkingError, IndexError, IndexManifest, RetrievedChunk};
