//! Process-wide error kinds and the structured wire payload.
//!
//! Every failure that crosses a process or protocol boundary is classified into one of the
//! kinds below. The tool server carries `{ kind, detail }` inside JSON-RPC `-32000` errors;
//! the proxy maps kinds onto HTTP status codes. Layer-local error enums (extraction,
//! embedding, completion) convert into [`ToolFault`] at the boundary.

use serde::{Deserialize, Serialize};

/// Classification of a failure, stable across the RPC and HTTP surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed caller input.
    BadInput,
    /// The referenced document handle does not exist.
    UnknownHandle,
    /// The PDF could not be opened or parsed.
    ExtractFailed,
    /// The PDF yielded too little text to index (likely image-only).
    LowYield,
    /// The embedder failed to produce vectors.
    EmbedFailed,
    /// The index could not be built or loaded.
    IndexUnavailable,
    /// Transient completion-endpoint failure (retried, then surfaced).
    ModelTransient,
    /// Permanent completion-endpoint rejection.
    ModelPermanent,
    /// The completion call exceeded its deadline.
    ModelTimeout,
    /// A tool call exceeded its deadline.
    Timeout,
    /// The tool-server child is gone and the restart budget is exhausted.
    BackendUnavailable,
    /// Unclassified internal failure.
    Internal,
}

impl ErrorKind {
    /// Stable snake_case label used in wire payloads and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadInput => "bad_input",
            Self::UnknownHandle => "unknown_handle",
            Self::ExtractFailed => "extract_failed",
            Self::LowYield => "low_yield",
            Self::EmbedFailed => "embed_failed",
            Self::IndexUnavailable => "index_unavailable",
            Self::ModelTransient => "model_transient",
            Self::ModelPermanent => "model_permanent",
            Self::ModelTimeout => "model_timeout",
            Self::Timeout => "timeout",
            Self::BackendUnavailable => "backend_unavailable",
            Self::Internal => "internal",
        }
    }

    /// HTTP status code the proxy responds with for this kind.
    pub fn http_status(self) -> u16 {
        match self {
            Self::BadInput | Self::ExtractFailed | Self::LowYield => 400,
            Self::UnknownHandle => 404,
            Self::EmbedFailed | Self::Internal => 500,
            Self::ModelTransient | Self::ModelPermanent => 502,
            Self::IndexUnavailable | Self::BackendUnavailable => 503,
            Self::ModelTimeout | Self::Timeout => 504,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure payload carried in JSON-RPC `-32000` errors and HTTP error bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct ToolFault {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Human-readable diagnostic.
    pub detail: String,
}

impl ToolFault {
    /// Build a fault from a kind and any displayable detail.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Shorthand for an [`ErrorKind::Internal`] fault.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }
}
