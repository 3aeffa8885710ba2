//! Tool-server child process supervision.
//!
//! The supervisor exclusively owns the child handle and both ends of its pipe pair:
//! requests go through an [`RpcChannel`] (serialized writer, single reader), child
//! stderr is pumped into the proxy's logs, and readiness is a successful `tools/list`
//! round-trip within a bounded timeout. When the response channel closes while the
//! proxy still needs it, the next call respawns the child, bounded by a restart
//! budget; once the budget is exhausted the supervisor enters a permanent-failure
//! state and every call answers `backend_unavailable`.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, Semaphore};

use crate::config::get_config;
use crate::error::{ErrorKind, ToolFault};
use crate::metrics::ServiceMetrics;
use crate::rpc::RpcChannel;

/// Deadline for the readiness probe after a spawn.
const READINESS_TIMEOUT: Duration = Duration::from_secs(15);

/// Grace period for the child to exit after its stdin closes.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Interface the HTTP layer uses to invoke tools; stubbed in tests.
#[async_trait]
pub trait ToolClient: Send + Sync {
    /// Invoke one tool and return its result payload.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolFault>;
}

/// Sliding-window restart budget.
#[derive(Debug)]
struct RestartBudget {
    max: u32,
    window: Duration,
    attempts: VecDeque<Instant>,
}

impl RestartBudget {
    fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            attempts: VecDeque::new(),
        }
    }

    /// Record one restart attempt at `now`; false when the budget is exhausted.
    fn try_consume(&mut self, now: Instant) -> bool {
        while let Some(&oldest) = self.attempts.front() {
            if now.duration_since(oldest) > self.window {
                self.attempts.pop_front();
            } else {
                break;
            }
        }
        if self.attempts.len() as u32 >= self.max {
            return false;
        }
        self.attempts.push_back(now);
        true
    }
}

struct BackendState {
    child: Option<Child>,
    channel: Option<Arc<RpcChannel>>,
    budget: RestartBudget,
}

/// Owner of the tool-server child process and its request channel.
pub struct Supervisor {
    state: Mutex<BackendState>,
    permits: Semaphore,
    call_timeout: Duration,
    executable: PathBuf,
    failed: AtomicBool,
    metrics: Arc<ServiceMetrics>,
}

impl Supervisor {
    /// Spawn the tool server and wait for readiness.
    pub async fn start(metrics: Arc<ServiceMetrics>) -> Result<Arc<Self>, ToolFault> {
        let config = get_config();
        let supervisor = Arc::new(Self {
            state: Mutex::new(BackendState {
                child: None,
                channel: None,
                budget: RestartBudget::new(
                    config.child_restart_max,
                    Duration::from_secs(config.child_restart_window_secs),
                ),
            }),
            permits: Semaphore::new(config.max_inflight_tool_calls),
            call_timeout: Duration::from_secs(config.tool_call_timeout_secs),
            executable: resolve_tool_server_bin(config.tool_server_bin.clone()),
            failed: AtomicBool::new(false),
            metrics,
        });

        {
            let mut state = supervisor.state.lock().await;
            supervisor.spawn_backend(&mut state).await?;
        }
        Ok(supervisor)
    }

    /// Whether the restart budget is exhausted.
    pub fn is_permanently_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    /// Close the child's stdin, wait briefly for a clean exit, then kill it.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.channel = None;
        if let Some(mut child) = state.child.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::info!(status = %status, "Tool server exited");
                }
                Ok(Err(error)) => {
                    tracing::warn!(error = %error, "Failed to reap tool server");
                }
                Err(_) => {
                    tracing::warn!("Tool server did not exit in time; killing");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }
    }

    /// Return a live channel, respawning the child within the restart budget.
    async fn ensure_channel(&self) -> Result<Arc<RpcChannel>, ToolFault> {
        if self.is_permanently_failed() {
            return Err(permanent_failure());
        }

        let mut state = self.state.lock().await;
        if let Some(channel) = &state.channel {
            if !channel.is_closed() {
                return Ok(Arc::clone(channel));
            }
            tracing::warn!("Tool server pipe closed; attempting restart");
            state.channel = None;
            if let Some(mut child) = state.child.take() {
                let _ = child.start_kill();
            }
        }

        if !state.budget.try_consume(Instant::now()) {
            self.failed.store(true, Ordering::Relaxed);
            tracing::error!("Tool server restart budget exhausted; entering permanent failure");
            return Err(permanent_failure());
        }
        self.metrics.record_restart();

        self.spawn_backend(&mut state).await?;
        Ok(Arc::clone(state.channel.as_ref().expect("channel just set")))
    }

    /// Spawn the child, wire its pipes, and probe readiness with `tools/list`.
    async fn spawn_backend(&self, state: &mut BackendState) -> Result<(), ToolFault> {
        tracing::info!(executable = %self.executable.display(), "Spawning tool server");
        let mut child = Command::new(&self.executable)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| {
                ToolFault::new(
                    ErrorKind::BackendUnavailable,
                    format!(
                        "failed to spawn tool server '{}': {error}",
                        self.executable.display()
                    ),
                )
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            ToolFault::new(ErrorKind::BackendUnavailable, "child stdin not piped")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            ToolFault::new(ErrorKind::BackendUnavailable, "child stdout not piped")
        })?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::info!(target: "askpdf::tool_server", "{line}");
                }
            });
        }

        let channel = RpcChannel::new(stdout, stdin);
        channel
            .call("tools/list", json!({}), READINESS_TIMEOUT)
            .await
            .map_err(|fault| {
                ToolFault::new(
                    ErrorKind::BackendUnavailable,
                    format!("tool server failed its readiness probe: {}", fault.detail),
                )
            })?;
        tracing::info!("Tool server is ready");

        state.child = Some(child);
        state.channel = Some(channel);
        Ok(())
    }
}

#[async_trait]
impl ToolClient for Supervisor {
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolFault> {
        let _permit = self.permits.try_acquire().map_err(|_| {
            ToolFault::new(
                ErrorKind::BackendUnavailable,
                "too many in-flight tool calls; retry shortly",
            )
        })?;

        let channel = self.ensure_channel().await?;
        channel
            .call(
                "tools/call",
                json!({ "name": name, "arguments": arguments }),
                self.call_timeout,
            )
            .await
    }
}

fn permanent_failure() -> ToolFault {
    ToolFault::new(
        ErrorKind::BackendUnavailable,
        "tool server is unavailable and the restart budget is exhausted",
    )
}

/// Resolve the tool-server executable: explicit override, then a sibling binary next
/// to the current executable, then `$PATH`.
fn resolve_tool_server_bin(configured: Option<PathBuf>) -> PathBuf {
    if let Some(path) = configured {
        return path;
    }
    if let Ok(current) = std::env::current_exe() {
        if let Some(dir) = current.parent() {
            let sibling = dir.join("askpdf-tools");
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from("askpdf-tools")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_budget_allows_up_to_max_within_window() {
        let mut budget = RestartBudget::new(3, Duration::from_secs(60));
        let now = Instant::now();
        assert!(budget.try_consume(now));
        assert!(budget.try_consume(now));
        assert!(budget.try_consume(now));
        assert!(!budget.try_consume(now));
    }

    #[test]
    fn restart_budget_recovers_after_the_window() {
        let mut budget = RestartBudget::new(2, Duration::from_millis(50));
        let start = Instant::now();
        assert!(budget.try_consume(start));
        assert!(budget.try_consume(start));
        assert!(!budget.try_consume(start));
        // Attempts older than the window are forgotten.
        let later = start + Duration::from_millis(120);
        assert!(budget.try_consume(later));
    }

    #[test]
    fn explicit_executable_override_wins() {
        let configured = PathBuf::from("/opt/custom/askpdf-tools");
        assert_eq!(
            resolve_tool_server_bin(Some(configured.clone())),
            configured
        );
    }
}
