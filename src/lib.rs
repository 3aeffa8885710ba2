#![deny(missing_docs)]

//! Core library for the askpdf question-answering service.

/// Remote completion-endpoint client.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and the deterministic default embedder.
pub mod embedding;
/// Process-wide error kinds and wire payloads.
pub mod error;
/// PDF text extraction and failure classification.
pub mod extract;
/// Structured logging and tracing setup.
pub mod logging;
/// Service counters surfaced through the health endpoint.
pub mod metrics;
/// Retrieval pipeline: chunking, vector index, registry, and service.
pub mod processing;
/// HTTP proxy and tool-server supervision.
pub mod proxy;
/// JSON-RPC 2.0 framing and request correlation.
pub mod rpc;
/// JSON-RPC tool server: catalogue, schemas, dispatch, stdio loop.
pub mod tools;
