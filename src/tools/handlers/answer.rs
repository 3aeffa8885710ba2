//! Handlers for the question-answering tools.

use std::path::Path;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::completion::{Completion, CompletionRequest};
use crate::error::{ErrorKind, ToolFault};
use crate::processing::build_grounded_prompt;
use crate::rpc::RpcError;
use crate::tools::ToolContext;

use super::{parse_arguments, require_non_empty};

/// Instruction for the single-pass full-document mode.
const FULL_DOCUMENT_INSTRUCTION: &str = "Answer the question using only the document below. \
If the document does not contain the answer, say so.";

/// Instruction for the optional formatting pass.
const FORMAT_INSTRUCTION: &str = "Rewrite the following answer as clean, well-structured \
markdown. Preserve every fact; do not add new information.\n\nAnswer:\n";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnswerQuestionRequest {
    pdf_path: String,
    question: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnswerRagRequest {
    pdf_path: String,
    question: String,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnswerMultipleRequest {
    pdf_path: String,
    questions: Vec<String>,
    #[serde(default)]
    top_k: Option<usize>,
}

/// Handle `answer_question`: one completion pass over the full document text.
///
/// Refuses documents above the configured character ceiling; large documents must go
/// through retrieval instead of flooding the completion endpoint.
pub(crate) async fn handle_answer_question(
    context: &ToolContext,
    arguments: Option<Value>,
) -> Result<Value, RpcError> {
    let request: AnswerQuestionRequest = parse_arguments(arguments)?;
    require_non_empty(&request.pdf_path, "pdf_path")?;
    require_non_empty(&request.question, "question")?;

    let document = context
        .retrieval
        .load_document(Path::new(&request.pdf_path))
        .await
        .map_err(|fault| RpcError::tool_failure(&fault))?;

    refuse_if_oversized(document.num_characters(), context.policy.full_doc_char_ceiling)
        .map_err(|fault| RpcError::tool_failure(&fault))?;

    let prompt = format!(
        "{FULL_DOCUMENT_INSTRUCTION}\n\n--- Document ---\n{}\n\nQuestion: {}\nAnswer:",
        document.text, request.question
    );
    let completion = context
        .completion
        .complete(CompletionRequest::grounded(prompt))
        .await
        .map_err(|error| RpcError::tool_failure(&error.to_fault()))?;

    Ok(answer_payload(&request.question, completion))
}

/// Handle `answer_question_rag`: retrieval-augmented answering.
pub(crate) async fn handle_answer_rag(
    context: &ToolContext,
    arguments: Option<Value>,
) -> Result<Value, RpcError> {
    let request: AnswerRagRequest = parse_arguments(arguments)?;
    require_non_empty(&request.pdf_path, "pdf_path")?;
    require_non_empty(&request.question, "question")?;
    if request.top_k == Some(0) {
        return Err(RpcError::invalid_params("`top_k` must be at least 1"));
    }

    answer_one(
        context,
        Path::new(&request.pdf_path),
        &request.question,
        request.top_k,
    )
    .await
    .map_err(|fault| RpcError::tool_failure(&fault))
}

/// Handle `answer_multiple_questions_rag`.
///
/// The batch never fails as a whole: each entry carries either `answer` or `error`.
pub(crate) async fn handle_answer_multiple(
    context: &ToolContext,
    arguments: Option<Value>,
) -> Result<Value, RpcError> {
    let request: AnswerMultipleRequest = parse_arguments(arguments)?;
    require_non_empty(&request.pdf_path, "pdf_path")?;
    if request.questions.is_empty() {
        return Err(RpcError::invalid_params(
            "`questions` must contain at least one question",
        ));
    }
    for question in &request.questions {
        require_non_empty(question, "questions")?;
    }

    // Questions are answered in order; the embedder and the completion endpoint are
    // the bottleneck, so fanning out buys nothing here.
    let path = Path::new(&request.pdf_path);
    let mut answers = Vec::with_capacity(request.questions.len());
    for question in &request.questions {
        let entry = match answer_one(context, path, question, request.top_k).await {
            Ok(entry) => entry,
            Err(fault) => json!({
                "question": question,
                "error": fault,
            }),
        };
        answers.push(entry);
    }

    Ok(json!({ "answers": answers }))
}

/// Retrieve, prompt, complete, and optionally reformat one answer.
async fn answer_one(
    context: &ToolContext,
    path: &Path,
    question: &str,
    top_k: Option<usize>,
) -> Result<Value, ToolFault> {
    let retrieved = context.retrieval.retrieve(path, question, top_k).await?;
    if retrieved.is_empty() {
        return Err(ToolFault::new(
            ErrorKind::LowYield,
            "the document has no indexable content to answer from",
        ));
    }

    let prompt = build_grounded_prompt(question, &retrieved);
    let mut completion = context
        .completion
        .complete(CompletionRequest::grounded(prompt))
        .await
        .map_err(|error| error.to_fault())?;

    if context.policy.format_answers {
        completion.answer_text = refine_answer(context, completion.answer_text).await;
    }
    Ok(answer_payload(question, completion))
}

/// Reject full-document analysis above the configured character ceiling.
fn refuse_if_oversized(num_characters: usize, ceiling: usize) -> Result<(), ToolFault> {
    if num_characters > ceiling {
        return Err(ToolFault::new(
            ErrorKind::BadInput,
            format!(
                "document has {num_characters} characters, above the {ceiling} ceiling for \
                 full-document analysis; use answer_question_rag instead"
            ),
        ));
    }
    Ok(())
}

/// Second formatting pass; its failure never fails the request.
async fn refine_answer(context: &ToolContext, raw: String) -> String {
    let prompt = format!("{FORMAT_INSTRUCTION}{raw}");
    match context
        .completion
        .complete(CompletionRequest::grounded(prompt))
        .await
    {
        Ok(formatted) if !formatted.answer_text.trim().is_empty() => formatted.answer_text,
        Ok(_) => raw,
        Err(error) => {
            tracing::warn!(error = %error, "Formatting pass failed; returning the raw answer");
            raw
        }
    }
}

fn answer_payload(question: &str, completion: Completion) -> Value {
    let mut payload = json!({
        "question": question,
        "answer": completion.answer_text,
        "model": completion.model_id,
    });
    if let Some(usage) = completion.token_usage {
        payload["usage"] = json!(usage);
    }
    payload
}
