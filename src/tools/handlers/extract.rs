//! Handlers for the extraction and search tools.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Value, json};

use crate::extract::{extract_metadata, search_pages};
use crate::rpc::RpcError;
use crate::tools::ToolContext;

use super::{parse_arguments, require_non_empty};

/// Arguments shared by the single-path extraction tools.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PdfPathRequest {
    /// Path of the PDF to operate on.
    pub(crate) pdf_path: String,
}

impl PdfPathRequest {
    pub(crate) fn validated(arguments: Option<Value>) -> Result<PathBuf, RpcError> {
        let request: Self = parse_arguments(arguments)?;
        require_non_empty(&request.pdf_path, "pdf_path")?;
        Ok(PathBuf::from(request.pdf_path))
    }
}

/// Handle `extract_pdf_text`.
pub(crate) async fn handle_extract_text(
    context: &ToolContext,
    arguments: Option<Value>,
) -> Result<Value, RpcError> {
    let path = PdfPathRequest::validated(arguments)?;
    let document = context
        .retrieval
        .load_document(&path)
        .await
        .map_err(|fault| RpcError::tool_failure(&fault))?;
    Ok(json!({
        "text": document.text,
        "num_pages": document.num_pages(),
        "num_characters": document.num_characters(),
    }))
}

/// Handle `extract_pdf_metadata`.
pub(crate) async fn handle_extract_metadata(
    _context: &ToolContext,
    arguments: Option<Value>,
) -> Result<Value, RpcError> {
    let path = PdfPathRequest::validated(arguments)?;
    let metadata = tokio::task::spawn_blocking(move || extract_metadata(&path))
        .await
        .map_err(|error| {
            RpcError::tool_failure(&crate::error::ToolFault::internal(format!(
                "metadata task failed: {error}"
            )))
        })?
        .map_err(|error| RpcError::tool_failure(&error.to_fault()))?;
    Ok(serde_json::to_value(metadata).unwrap_or_else(|_| json!({})))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchPdfRequest {
    pdf_path: String,
    needle: String,
    #[serde(default)]
    case_sensitive: bool,
}

/// Handle `search_pdf`.
pub(crate) async fn handle_search_pdf(
    context: &ToolContext,
    arguments: Option<Value>,
) -> Result<Value, RpcError> {
    let request: SearchPdfRequest = parse_arguments(arguments)?;
    require_non_empty(&request.pdf_path, "pdf_path")?;
    require_non_empty(&request.needle, "needle")?;

    let document = context
        .retrieval
        .load_document(Path::new(&request.pdf_path))
        .await
        .map_err(|fault| RpcError::tool_failure(&fault))?;
    let matches = search_pages(&document.pages, &request.needle, request.case_sensitive);
    let total = matches.len();
    Ok(json!({ "matches": matches, "total": total }))
}
