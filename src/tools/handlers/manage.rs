//! Handlers for document preparation and removal.

use serde_json::{Value, json};

use crate::processing::chunk_text;
use crate::rpc::RpcError;
use crate::tools::ToolContext;

use super::extract::PdfPathRequest;

/// Handle `prepare_pdf`: extract and chunk without embedding.
///
/// Used by the upload path to report counts cheaply; indexing proper happens lazily on
/// the first question so image-only uploads still succeed and cache-hit timing stays
/// observable.
pub(crate) async fn handle_prepare(
    context: &ToolContext,
    arguments: Option<Value>,
) -> Result<Value, RpcError> {
    let path = PdfPathRequest::validated(arguments)?;
    let document = context
        .retrieval
        .load_document(&path)
        .await
        .map_err(|fault| RpcError::tool_failure(&fault))?;

    let num_chunks = if document.text.trim().is_empty() {
        0
    } else {
        chunk_text(&document.text, context.retrieval.chunk_params(), "preview")
            .map_err(|error| RpcError::tool_failure(&error.to_fault()))?
            .len()
    };

    Ok(json!({
        "num_pages": document.num_pages(),
        "num_characters": document.num_characters(),
        "num_chunks": num_chunks,
    }))
}

/// Handle `forget_pdf`: drop the in-memory index and unlink cached files.
pub(crate) async fn handle_forget(
    context: &ToolContext,
    arguments: Option<Value>,
) -> Result<Value, RpcError> {
    let path = PdfPathRequest::validated(arguments)?;
    let forgotten = context
        .retrieval
        .forget(&path)
        .await
        .map_err(|fault| RpcError::tool_failure(&fault))?;
    Ok(json!({ "forgotten": forgotten }))
}
