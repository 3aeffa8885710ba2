//! Newline-framed JSON-RPC 2.0 messages and request correlation.
//!
//! Both processes speak the same wire dialect: one JSON object per line, requests
//! correlated to responses by a numeric `id`, and tool failures carried as `-32000`
//! errors with a structured `{ kind, detail }` payload. The tool server consumes
//! [`Request`] values from stdin and writes [`Response`] lines to stdout; the proxy
//! drives the other end through [`RpcChannel`], which owns the single stdout reader,
//! the serialized stdin writer, and the waiter map keyed by request id.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, oneshot, watch};

use crate::error::{ErrorKind, ToolFault};

/// JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// Request or response body could not be parsed as JSON.
pub const PARSE_ERROR: i64 = -32700;
/// Message was JSON but not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// The requested method or tool is not part of the catalogue.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Arguments failed boundary validation.
pub const INVALID_PARAMS: i64 = -32602;
/// The server failed internally while handling a valid request.
pub const INTERNAL_ERROR: i64 = -32603;
/// A recognized operation failed; `data` carries `{ kind, detail }`.
pub const TOOL_FAILURE: i64 = -32000;

/// A single JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version; always `"2.0"`.
    pub jsonrpc: String,
    /// Correlation id. Absent on notifications, which this system never issues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Method name (`tools/list` or `tools/call`).
    pub method: String,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Build a call request with the given correlation id.
    pub fn call(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: Some(id),
            method: method.into(),
            params: Some(params),
        }
    }
}

/// A single JSON-RPC response; exactly one of `result`/`error` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version; always `"2.0"`.
    pub jsonrpc: String,
    /// Correlation id echoed from the request.
    #[serde(default)]
    pub id: Option<u64>,
    /// Successful result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Build a success response.
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn failure(id: Option<u64>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Structured payload; `{ kind, detail }` for `-32000` failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// `-32601` for a method or tool outside the catalogue.
    pub fn method_not_found(name: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("Unknown method or tool: {name}"),
            data: None,
        }
    }

    /// `-32602` naming the offending field.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: message.into(),
            data: None,
        }
    }

    /// `-32700` for unparseable request lines.
    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self {
            code: PARSE_ERROR,
            message: detail.into(),
            data: None,
        }
    }

    /// `-32000` carrying a structured [`ToolFault`].
    pub fn tool_failure(fault: &ToolFault) -> Self {
        Self {
            code: TOOL_FAILURE,
            message: fault.detail.clone(),
            data: serde_json::to_value(fault).ok(),
        }
    }

    /// Recover the structured fault carried by this error.
    ///
    /// `-32000` errors decode their `data` payload; protocol-level codes map to
    /// `bad_input`; anything else is `internal`.
    pub fn to_fault(&self) -> ToolFault {
        if self.code == TOOL_FAILURE {
            if let Some(data) = &self.data {
                if let Ok(fault) = serde_json::from_value::<ToolFault>(data.clone()) {
                    return fault;
                }
            }
            return ToolFault::internal(self.message.clone());
        }
        match self.code {
            METHOD_NOT_FOUND | INVALID_PARAMS | INVALID_REQUEST | PARSE_ERROR => {
                ToolFault::new(ErrorKind::BadInput, self.message.clone())
            }
            _ => ToolFault::internal(self.message.clone()),
        }
    }
}

/// Serialize a message and write it as one newline-terminated line.
///
/// The line is assembled in memory first so the underlying writer sees a single
/// contiguous write; a reader splitting on `\n` never observes a partial object.
pub async fn write_line<W, T>(writer: &mut W, message: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(message).map_err(std::io::Error::other)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

type Waiters = std::sync::Mutex<HashMap<u64, oneshot::Sender<Response>>>;

/// Proxy-side correlation engine over a child's stdin/stdout pipe pair.
///
/// One dedicated task reads newline-delimited responses and dispatches each to the
/// waiter registered under its `id`; writes are serialized through a mutex so a
/// request is always one complete line. Every call carries a deadline; responses
/// arriving after their waiter gave up are logged and discarded.
pub struct RpcChannel {
    writer: Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
    waiters: Arc<Waiters>,
    next_id: AtomicU64,
    closed_rx: watch::Receiver<bool>,
}

impl RpcChannel {
    /// Wrap a pipe pair and spawn the reader task.
    pub fn new<R, W>(reader: R, writer: W) -> Arc<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let waiters: Arc<Waiters> = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let (closed_tx, closed_rx) = watch::channel(false);

        let reader_waiters = Arc::clone(&waiters);
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<Response>(&line) {
                            Ok(response) => dispatch_response(&reader_waiters, response),
                            Err(error) => {
                                tracing::warn!(error = %error, "Discarding unparseable response line");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(error) => {
                        tracing::warn!(error = %error, "Response channel read failed");
                        break;
                    }
                }
            }
            fail_all_waiters(&reader_waiters);
            let _ = closed_tx.send(true);
        });

        Arc::new(Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            waiters,
            next_id: AtomicU64::new(0),
            closed_rx,
        })
    }

    /// Whether the reader has observed EOF on the response channel.
    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }

    /// Watch for response-channel closure (child exit).
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.closed_rx.clone()
    }

    /// Issue one request and await its response within `deadline`.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, ToolFault> {
        if self.is_closed() {
            return Err(ToolFault::new(
                ErrorKind::BackendUnavailable,
                "tool server pipe is closed",
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .expect("waiter map poisoned")
            .insert(id, tx);

        let request = Request::call(id, method, params);
        let mut line = match serde_json::to_vec(&request) {
            Ok(line) => line,
            Err(error) => {
                self.remove_waiter(id);
                return Err(ToolFault::internal(format!(
                    "failed to serialize tool request: {error}"
                )));
            }
        };
        line.push(b'\n');

        // The locked write runs detached so a cancelled caller (e.g. an HTTP client
        // disconnect) can never leave a partial frame on the pipe.
        let writer = Arc::clone(&self.writer);
        let write_task = tokio::spawn(async move {
            let mut writer = writer.lock().await;
            writer.write_all(&line).await?;
            writer.flush().await
        });
        match write_task.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                self.remove_waiter(id);
                return Err(ToolFault::new(
                    ErrorKind::BackendUnavailable,
                    format!("failed to write tool request: {error}"),
                ));
            }
            Err(error) => {
                self.remove_waiter(id);
                return Err(ToolFault::internal(format!("write task failed: {error}")));
            }
        }

        let response = match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                // Reader task dropped the sender: the channel failed mid-flight.
                return Err(ToolFault::new(
                    ErrorKind::BackendUnavailable,
                    "tool server exited before responding",
                ));
            }
            Err(_) => {
                self.remove_waiter(id);
                return Err(ToolFault::new(
                    ErrorKind::Timeout,
                    format!("tool call '{method}' exceeded {deadline:?}"),
                ));
            }
        };

        match (response.result, response.error) {
            (Some(result), None) => Ok(result),
            (_, Some(error)) => Err(error.to_fault()),
            (None, None) => Err(ToolFault::internal(
                "response carried neither result nor error",
            )),
        }
    }

    fn remove_waiter(&self, id: u64) {
        self.waiters.lock().expect("waiter map poisoned").remove(&id);
    }
}

fn dispatch_response(waiters: &Waiters, response: Response) {
    let Some(id) = response.id else {
        tracing::warn!("Discarding response without id");
        return;
    };
    let waiter = waiters.lock().expect("waiter map poisoned").remove(&id);
    match waiter {
        Some(tx) => {
            let _ = tx.send(response);
        }
        None => {
            tracing::debug!(id, "Discarding late or unknown response");
        }
    }
}

fn fail_all_waiters(waiters: &Waiters) {
    let drained: Vec<(u64, oneshot::Sender<Response>)> = waiters
        .lock()
        .expect("waiter map poisoned")
        .drain()
        .collect();
    if !drained.is_empty() {
        tracing::warn!(
            pending = drained.len(),
            "Response channel closed with outstanding requests"
        );
    }
    for (id, tx) in drained {
        let fault = ToolFault::new(ErrorKind::BackendUnavailable, "tool server exited");
        let _ = tx.send(Response::failure(Some(id), RpcError::tool_failure(&fault)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader, duplex, split};

    #[test]
    fn request_serializes_with_version_and_id() {
        let request = Request::call(7, "tools/list", serde_json::json!({}));
        let json = serde_json::to_value(&request).expect("serialize request");
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 7);
        assert_eq!(json["method"], "tools/list");
    }

    #[test]
    fn tool_failure_round_trips_kind_and_detail() {
        let fault = ToolFault::new(ErrorKind::ExtractFailed, "corrupt xref table");
        let error = RpcError::tool_failure(&fault);
        assert_eq!(error.code, TOOL_FAILURE);
        assert_eq!(error.to_fault(), fault);
    }

    #[test]
    fn protocol_errors_map_to_bad_input() {
        let error = RpcError::invalid_params("`pdf_path` is required");
        assert_eq!(error.to_fault().kind, ErrorKind::BadInput);
        let error = RpcError::method_not_found("nope");
        assert_eq!(error.to_fault().kind, ErrorKind::BadInput);
    }

    #[tokio::test]
    async fn responses_correlate_out_of_order() {
        let (ours, theirs) = duplex(4096);
        let (our_read, our_write) = split(ours);
        let (their_read, mut their_write) = split(theirs);
        let channel = RpcChannel::new(our_read, our_write);

        // Echo server that answers the second request first.
        tokio::spawn(async move {
            let mut lines = BufReader::new(their_read).lines();
            let mut pending = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                let request: Request = serde_json::from_str(&line).expect("request line");
                pending.push(request);
                if pending.len() == 2 {
                    for request in pending.drain(..).rev() {
                        let id = request.id.expect("call id");
                        let response =
                            Response::success(id, serde_json::json!({ "method": request.method }));
                        write_line(&mut their_write, &response).await.expect("write");
                    }
                }
            }
        });

        let first = channel.call("alpha", serde_json::json!({}), Duration::from_secs(5));
        let second = channel.call("beta", serde_json::json!({}), Duration::from_secs(5));
        let (first, second) = tokio::join!(first, second);
        assert_eq!(first.expect("first result")["method"], "alpha");
        assert_eq!(second.expect("second result")["method"], "beta");
    }

    #[tokio::test]
    async fn expired_deadline_releases_the_waiter() {
        let (ours, theirs) = duplex(4096);
        let (our_read, our_write) = split(ours);
        let channel = RpcChannel::new(our_read, our_write);
        // Keep the far end alive but silent.
        let _theirs = theirs;

        let error = channel
            .call("slow", serde_json::json!({}), Duration::from_millis(20))
            .await
            .expect_err("deadline must expire");
        assert_eq!(error.kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn eof_fails_outstanding_waiters() {
        let (ours, theirs) = duplex(4096);
        let (our_read, our_write) = split(ours);
        let channel = RpcChannel::new(our_read, our_write);

        let call = channel.call("orphan", serde_json::json!({}), Duration::from_secs(5));
        let drop_pipe = async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(theirs);
        };
        let (result, ()) = tokio::join!(call, drop_pipe);
        let error = result.expect_err("EOF must fail the call");
        assert_eq!(error.kind, ErrorKind::BackendUnavailable);

        let mut closed = channel.closed();
        closed.wait_for(|closed| *closed).await.expect("closed signal");
        assert!(channel.is_closed());
    }
}
