//! Handlers for the summarization tools.

use std::path::Path;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::completion::CompletionRequest;
use crate::rpc::RpcError;
use crate::tools::ToolContext;

use super::{parse_arguments, require_non_empty};

const SUMMARY_INSTRUCTION: &str = "Summarize the document below. Cover the main topics and \
conclusions; do not add information that is not in the document.";

const KEY_POINTS_INSTRUCTION: &str = "List the key points of the document below as a markdown \
bullet list, most important first. One point per line, starting with '- '. Do not add \
information that is not in the document.";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SummarizeRequest {
    pdf_path: String,
    #[serde(default)]
    max_length: Option<usize>,
}

/// Handle `summarize_document`.
pub(crate) async fn handle_summarize(
    context: &ToolContext,
    arguments: Option<Value>,
) -> Result<Value, RpcError> {
    let request: SummarizeRequest = parse_arguments(arguments)?;
    require_non_empty(&request.pdf_path, "pdf_path")?;
    if request.max_length == Some(0) {
        return Err(RpcError::invalid_params("`max_length` must be at least 1"));
    }

    let excerpt = document_excerpt(context, &request.pdf_path).await?;
    let budget = request
        .max_length
        .map(|words| format!(" Use at most {words} words."))
        .unwrap_or_default();
    let prompt = format!("{SUMMARY_INSTRUCTION}{budget}\n\n--- Document ---\n{excerpt}");

    let completion = context
        .completion
        .complete(CompletionRequest::grounded(prompt))
        .await
        .map_err(|error| RpcError::tool_failure(&error.to_fault()))?;

    Ok(json!({
        "summary": completion.answer_text,
        "model": completion.model_id,
    }))
}

/// Handle `extract_key_points`.
pub(crate) async fn handle_key_points(
    context: &ToolContext,
    arguments: Option<Value>,
) -> Result<Value, RpcError> {
    let request: super::extract::PdfPathRequest = parse_arguments(arguments)?;
    require_non_empty(&request.pdf_path, "pdf_path")?;

    let excerpt = document_excerpt(context, &request.pdf_path).await?;
    let prompt = format!("{KEY_POINTS_INSTRUCTION}\n\n--- Document ---\n{excerpt}");

    let completion = context
        .completion
        .complete(CompletionRequest::grounded(prompt))
        .await
        .map_err(|error| RpcError::tool_failure(&error.to_fault()))?;

    Ok(json!({
        "key_points": parse_bullets(&completion.answer_text),
        "model": completion.model_id,
    }))
}

/// Load the document and bound the prompt text by the full-document ceiling.
async fn document_excerpt(context: &ToolContext, pdf_path: &str) -> Result<String, RpcError> {
    let document = context
        .retrieval
        .load_document(Path::new(pdf_path))
        .await
        .map_err(|fault| RpcError::tool_failure(&fault))?;
    Ok(truncate_chars(
        &document.text,
        context.policy.full_doc_char_ceiling,
    ))
}

/// Truncate to at most `limit` characters on a char boundary.
fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

/// Turn a markdown-ish bullet answer into an ordered list of points.
fn parse_bullets(answer: &str) -> Vec<String> {
    answer
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(['-', '*', '•'])
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
                .trim()
        })
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::INVALID_PARAMS;
    use crate::tools::testutil::test_context;

    #[test]
    fn bullets_parse_from_common_markers() {
        let answer = "- First point\n* Second point\n1. Third point\n\n  - Fourth";
        assert_eq!(
            parse_bullets(answer),
            vec!["First point", "Second point", "Third point", "Fourth"]
        );
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[tokio::test]
    async fn zero_max_length_is_invalid_params() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let context = test_context(workdir.path().join("cache"));
        let error = handle_summarize(
            &context,
            Some(json!({ "pdf_path": "/doc.pdf", "max_length": 0 })),
        )
        .await
        .expect_err("zero budget");
        assert_eq!(error.code, INVALID_PARAMS);
    }
}
