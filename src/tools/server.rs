//! Tool-server dispatch and the newline-framed stdio serve loop.
//!
//! The server reads one JSON-RPC request per line from its input, handles requests
//! concurrently, and writes each response as a single line through a shared writer
//! lock so frames never interleave. Stdout is reserved for responses; all logging
//! goes to stderr. Lifecycle: `starting → ready → serving → shutting_down → exited`,
//! with the `ready → serving` transition logged on the first request and a bounded
//! grace period for in-flight requests after stdin EOF.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::completion::CompletionApi;
use crate::processing::RetrievalService;
use crate::rpc::{Request, Response, RpcError, write_line};

use super::{ToolContext, ToolName, ToolPolicy, catalogue, handlers};

/// How long in-flight requests may run after stdin reaches EOF.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Parameters of a `tools/call` request.
#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// The JSON-RPC tool server.
pub struct ToolServer {
    context: ToolContext,
    serving: AtomicBool,
}

impl ToolServer {
    /// Assemble a server from its dependencies.
    pub fn new(
        retrieval: Arc<RetrievalService>,
        completion: Arc<dyn CompletionApi>,
        policy: ToolPolicy,
    ) -> Self {
        Self {
            context: ToolContext {
                retrieval,
                completion,
                policy,
            },
            serving: AtomicBool::new(false),
        }
    }

    /// Handle one request and produce its response.
    pub async fn handle(&self, request: Request) -> Option<Response> {
        let Some(id) = request.id else {
            // Notifications are not part of this protocol; nothing to answer.
            tracing::warn!(method = %request.method, "Ignoring request without id");
            return None;
        };

        if !self.serving.swap(true, Ordering::Relaxed) {
            tracing::info!("First request received; serving");
        }

        let response = match request.method.as_str() {
            "tools/list" => Response::success(id, json!({ "tools": catalogue() })),
            "tools/call" => match self.dispatch(request.params).await {
                Ok(result) => Response::success(id, result),
                Err(error) => Response::failure(Some(id), error),
            },
            other => Response::failure(Some(id), RpcError::method_not_found(other)),
        };
        Some(response)
    }

    async fn dispatch(&self, params: Option<Value>) -> Result<Value, RpcError> {
        let params: CallParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|err| RpcError::invalid_params(format!("Invalid tools/call params: {err}")))?;
        let tool = ToolName::from_str(&params.name)
            .map_err(|()| RpcError::method_not_found(&params.name))?;
        let context = &self.context;

        tracing::debug!(tool = params.name, "Dispatching tool call");
        match tool {
            ToolName::ExtractPdfText => {
                handlers::extract::handle_extract_text(context, params.arguments).await
            }
            ToolName::ExtractPdfMetadata => {
                handlers::extract::handle_extract_metadata(context, params.arguments).await
            }
            ToolName::SearchPdf => {
                handlers::extract::handle_search_pdf(context, params.arguments).await
            }
            ToolName::AnswerQuestion => {
                handlers::answer::handle_answer_question(context, params.arguments).await
            }
            ToolName::AnswerQuestionRag => {
                handlers::answer::handle_answer_rag(context, params.arguments).await
            }
            ToolName::AnswerMultipleQuestionsRag => {
                handlers::answer::handle_answer_multiple(context, params.arguments).await
            }
            ToolName::SummarizeDocument => {
                handlers::summarize::handle_summarize(context, params.arguments).await
            }
            ToolName::ExtractKeyPoints => {
                handlers::summarize::handle_key_points(context, params.arguments).await
            }
            ToolName::PreparePdf => {
                handlers::manage::handle_prepare(context, params.arguments).await
            }
            ToolName::ForgetPdf => handlers::manage::handle_forget(context, params.arguments).await,
        }
    }
}

/// Serve requests from `reader`, writing responses to `writer`, until EOF.
///
/// Requests are handled concurrently; each response is written atomically as one
/// newline-terminated line. After EOF, in-flight requests get a bounded grace period
/// before the loop returns.
pub async fn serve<R, W>(server: Arc<ToolServer>, reader: R, writer: W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = Arc::new(Mutex::new(writer));
    let mut lines = BufReader::new(reader).lines();
    let mut inflight: JoinSet<()> = JoinSet::new();

    tracing::info!("Tool server ready");
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request = match serde_json::from_str::<Request>(&line) {
            Ok(request) => request,
            Err(error) => {
                let response = Response::failure(
                    None,
                    RpcError::parse_error(format!("unparseable request: {error}")),
                );
                let mut writer = writer.lock().await;
                write_line(&mut *writer, &response).await?;
                continue;
            }
        };

        let server = Arc::clone(&server);
        let writer = Arc::clone(&writer);
        inflight.spawn(async move {
            if let Some(response) = server.handle(request).await {
                let mut writer = writer.lock().await;
                if let Err(error) = write_line(&mut *writer, &response).await {
                    tracing::error!(error = %error, "Failed to write response");
                }
            }
        });

        // Reap finished tasks so the set does not grow unbounded.
        while inflight.try_join_next().is_some() {}
    }

    tracing::info!("Stdin closed; shutting down");
    let drain = async {
        while inflight.join_next().await.is_some() {}
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Grace period expired; abandoning in-flight requests"
        );
        inflight.abort_all();
    }
    tracing::info!("Tool server exited");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_context;
    use tokio::io::{AsyncWriteExt, duplex, split};

    fn test_server(cache_dir: std::path::PathBuf) -> Arc<ToolServer> {
        let context = test_context(cache_dir);
        Arc::new(ToolServer::new(
            context.retrieval,
            context.completion,
            context.policy,
        ))
    }

    async fn roundtrip(server: Arc<ToolServer>, requests: Vec<Value>) -> Vec<Response> {
        let (client, server_side) = duplex(64 * 1024);
        let (server_read, server_write) = split(server_side);
        let serve_task = tokio::spawn(serve(server, server_read, server_write));

        let (client_read, mut client_write) = split(client);
        for request in &requests {
            let mut line = serde_json::to_vec(request).expect("serialize");
            line.push(b'\n');
            client_write.write_all(&line).await.expect("write");
        }
        client_write.shutdown().await.expect("shutdown");
        drop(client_write);

        let mut responses = Vec::new();
        let mut lines = BufReader::new(client_read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            responses.push(serde_json::from_str::<Response>(&line).expect("response line"));
        }
        serve_task.await.expect("join").expect("serve");
        responses
    }

    #[tokio::test]
    async fn tools_list_returns_the_catalogue() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let server = test_server(workdir.path().join("cache"));
        let responses = roundtrip(
            server,
            vec![json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" })],
        )
        .await;

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, Some(1));
        let tools = responses[0].result.as_ref().expect("result")["tools"]
            .as_array()
            .expect("tools array")
            .clone();
        assert_eq!(tools.len(), ToolName::ALL.len());
        assert!(tools.iter().any(|tool| tool["name"] == "answer_question_rag"));
        assert!(tools.iter().all(|tool| tool["input_schema"]["type"] == "object"));
    }

    #[tokio::test]
    async fn unknown_method_and_tool_yield_method_not_found() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let server = test_server(workdir.path().join("cache"));
        let responses = roundtrip(
            server,
            vec![
                json!({ "jsonrpc": "2.0", "id": 1, "method": "no/such" }),
                json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                        "params": { "name": "no_such_tool", "arguments": {} } }),
            ],
        )
        .await;

        assert_eq!(responses.len(), 2);
        for response in responses {
            assert_eq!(
                response.error.expect("error").code,
                crate::rpc::METHOD_NOT_FOUND
            );
        }
    }

    #[tokio::test]
    async fn missing_arguments_yield_invalid_params() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let server = test_server(workdir.path().join("cache"));
        let responses = roundtrip(
            server,
            vec![json!({ "jsonrpc": "2.0", "id": 7, "method": "tools/call",
                         "params": { "name": "extract_pdf_text", "arguments": {} } })],
        )
        .await;

        let error = responses[0].error.as_ref().expect("error");
        assert_eq!(error.code, crate::rpc::INVALID_PARAMS);
        assert!(error.message.contains("pdf_path"));
        assert_eq!(responses[0].id, Some(7));
    }

    #[tokio::test]
    async fn tool_failures_carry_structured_payloads() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let server = test_server(workdir.path().join("cache"));
        let responses = roundtrip(
            server,
            vec![json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                         "params": { "name": "extract_pdf_text",
                                     "arguments": { "pdf_path": "/missing.pdf" } } })],
        )
        .await;

        let error = responses[0].error.as_ref().expect("error");
        assert_eq!(error.code, crate::rpc::TOOL_FAILURE);
        let data = error.data.as_ref().expect("structured payload");
        assert_eq!(data["kind"], "extract_failed");
    }

    #[tokio::test]
    async fn every_response_is_one_parseable_line_with_an_id() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let server = test_server(workdir.path().join("cache"));
        let requests: Vec<Value> = (1..=5)
            .map(|id| json!({ "jsonrpc": "2.0", "id": id, "method": "tools/list" }))
            .collect();
        let responses = roundtrip(server, requests).await;

        assert_eq!(responses.len(), 5);
        let mut ids: Vec<u64> = responses
            .iter()
            .map(|response| response.id.expect("id"))
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn unparseable_lines_get_a_parse_error_response() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let server = test_server(workdir.path().join("cache"));

        let (client, server_side) = duplex(16 * 1024);
        let (server_read, server_write) = split(server_side);
        let serve_task = tokio::spawn(serve(server, server_read, server_write));

        let (client_read, mut client_write) = split(client);
        client_write
            .write_all(b"this is not json\n")
            .await
            .expect("write");
        client_write.shutdown().await.expect("shutdown");

        let mut lines = BufReader::new(client_read).lines();
        let line = lines.next_line().await.expect("read").expect("one line");
        let response: Response = serde_json::from_str(&line).expect("parse");
        assert_eq!(response.error.expect("error").code, crate::rpc::PARSE_ERROR);
        serve_task.await.expect("join").expect("serve");
    }
}
