//! JSON-RPC tool server: catalogue, schemas, dispatch, and the stdio serve loop.

use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::completion::CompletionApi;
use crate::config::get_config;
use crate::processing::RetrievalService;

pub mod handlers;
pub mod schemas;
pub mod server;

pub use server::{ToolServer, serve};

/// The closed set of tools this server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    /// Extract the full text of a PDF.
    ExtractPdfText,
    /// Read PDF metadata without extracting text.
    ExtractPdfMetadata,
    /// Find occurrences of a needle across pages.
    SearchPdf,
    /// Single-pass answer over the full document (small PDFs only).
    AnswerQuestion,
    /// Retrieval-augmented answer (preferred).
    AnswerQuestionRag,
    /// Retrieval-augmented answers for a batch of questions.
    AnswerMultipleQuestionsRag,
    /// Summarize the document.
    SummarizeDocument,
    /// Extract the document's key points as bullets.
    ExtractKeyPoints,
    /// Extract and chunk without embedding; reports counts for upload responses.
    PreparePdf,
    /// Drop the document's in-memory index and cached files.
    ForgetPdf,
}

impl ToolName {
    /// Every tool, in catalogue order.
    pub const ALL: [ToolName; 10] = [
        Self::ExtractPdfText,
        Self::ExtractPdfMetadata,
        Self::SearchPdf,
        Self::AnswerQuestion,
        Self::AnswerQuestionRag,
        Self::AnswerMultipleQuestionsRag,
        Self::SummarizeDocument,
        Self::ExtractKeyPoints,
        Self::PreparePdf,
        Self::ForgetPdf,
    ];

    /// Wire name of the tool.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExtractPdfText => "extract_pdf_text",
            Self::ExtractPdfMetadata => "extract_pdf_metadata",
            Self::SearchPdf => "search_pdf",
            Self::AnswerQuestion => "answer_question",
            Self::AnswerQuestionRag => "answer_question_rag",
            Self::AnswerMultipleQuestionsRag => "answer_multiple_questions_rag",
            Self::SummarizeDocument => "summarize_document",
            Self::ExtractKeyPoints => "extract_key_points",
            Self::PreparePdf => "prepare_pdf",
            Self::ForgetPdf => "forget_pdf",
        }
    }

    /// One-line description shown in the catalogue.
    pub fn description(self) -> &'static str {
        match self {
            Self::ExtractPdfText => "Extract the full text of a PDF with page and character counts.",
            Self::ExtractPdfMetadata => {
                "Read title, author, page count, and file size without extracting text."
            }
            Self::SearchPdf => "Find every occurrence of a text needle with page and offset.",
            Self::AnswerQuestion => {
                "Answer a question from the full document in one pass; refuses large PDFs."
            }
            Self::AnswerQuestionRag => {
                "Answer a question from the most relevant document chunks (preferred)."
            }
            Self::AnswerMultipleQuestionsRag => {
                "Answer several questions in one call; failures are isolated per question."
            }
            Self::SummarizeDocument => "Produce a concise summary of the document.",
            Self::ExtractKeyPoints => "List the document's key points as ordered bullets.",
            Self::PreparePdf => {
                "Extract and chunk a PDF without embedding; reports page and chunk counts."
            }
            Self::ForgetPdf => "Drop the document's index and cached files.",
        }
    }

    /// Static JSON schema for the tool's arguments.
    pub fn input_schema(self) -> Value {
        match self {
            Self::ExtractPdfText | Self::ExtractPdfMetadata | Self::PreparePdf | Self::ForgetPdf => {
                schemas::pdf_path_only_schema()
            }
            Self::SearchPdf => schemas::search_pdf_schema(),
            Self::AnswerQuestion => schemas::answer_question_schema(),
            Self::AnswerQuestionRag => schemas::answer_question_rag_schema(),
            Self::AnswerMultipleQuestionsRag => schemas::answer_multiple_schema(),
            Self::SummarizeDocument => schemas::summarize_schema(),
            Self::ExtractKeyPoints => schemas::pdf_path_only_schema(),
        }
    }
}

impl FromStr for ToolName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or(())
    }
}

/// Catalogue entry returned from `tools/list`.
#[derive(Debug, Serialize)]
pub struct ToolDescriptor {
    /// Wire name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// JSON schema of the arguments object.
    pub input_schema: Value,
}

/// The full tool catalogue with input schemas.
pub fn catalogue() -> Vec<ToolDescriptor> {
    ToolName::ALL
        .into_iter()
        .map(|tool| ToolDescriptor {
            name: tool.as_str(),
            description: tool.description(),
            input_schema: tool.input_schema(),
        })
        .collect()
}

/// Behavior knobs the handlers need, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ToolPolicy {
    /// Ceiling on full-document analysis in characters.
    pub full_doc_char_ceiling: usize,
    /// Whether answers get a second formatting pass.
    pub format_answers: bool,
}

impl ToolPolicy {
    /// Resolve the policy from the process configuration.
    pub fn from_config() -> Self {
        let config = get_config();
        Self {
            full_doc_char_ceiling: config.full_doc_char_ceiling,
            format_answers: config.format_answers,
        }
    }
}

/// Shared dependencies handed to every tool handler.
pub struct ToolContext {
    /// Retrieval pipeline shared across tools.
    pub retrieval: Arc<RetrievalService>,
    /// Completion endpoint client.
    pub completion: Arc<dyn CompletionApi>,
    /// Behavior knobs.
    pub policy: ToolPolicy,
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::completion::{Completion, CompletionError, CompletionRequest};
    use crate::embedding::HashEmbedder;
    use crate::processing::ChunkParams;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Completion stub that records prompts and replies from a script.
    pub(crate) struct StubCompletion {
        pub prompts: Mutex<Vec<String>>,
        pub replies: Mutex<Vec<Result<String, CompletionError>>>,
    }

    impl StubCompletion {
        pub(crate) fn answering(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                prompts: Mutex::new(Vec::new()),
                replies: Mutex::new(vec![Ok(answer.to_string())]),
            })
        }

        pub(crate) fn scripted(replies: Vec<Result<String, CompletionError>>) -> Arc<Self> {
            Arc::new(Self {
                prompts: Mutex::new(Vec::new()),
                replies: Mutex::new(replies),
            })
        }
    }

    #[async_trait]
    impl CompletionApi for StubCompletion {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<Completion, CompletionError> {
            self.prompts.lock().unwrap().push(request.prompt);
            let mut replies = self.replies.lock().unwrap();
            let reply = if replies.len() > 1 {
                replies.remove(0)
            } else {
                replies[0]
                    .as_ref()
                    .map(Clone::clone)
                    .map_err(|error| CompletionError::Transient(error.to_string()))
            };
            reply.map(|answer_text| Completion {
                answer_text,
                model_id: "stub-model".into(),
                token_usage: None,
            })
        }
    }

    pub(crate) fn test_context(cache_dir: std::path::PathBuf) -> ToolContext {
        ToolContext {
            retrieval: Arc::new(RetrievalService::new(
                Box::new(HashEmbedder::new("hash-test", 32)),
                cache_dir,
                ChunkParams {
                    chunk_size: 120,
                    overlap: 30,
                },
                3,
            )),
            completion: StubCompletion::answering("stub answer"),
            policy: ToolPolicy {
                full_doc_char_ceiling: 40_000,
                format_answers: false,
            },
        }
    }
}
