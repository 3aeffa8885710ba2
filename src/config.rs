//! Environment-driven configuration for askpdf.
//!
//! This module loads and validates settings once at startup (via `init_config`) and exposes
//! a global, read-only view through `get_config`. The configuration powers both the HTTP
//! proxy and the tool server and includes:
//!
//! - Completion endpoint access (`MODEL_API_KEY`, `MODEL_API_URL?`, `MODEL_ID?`,
//!   `MODEL_TIMEOUT_SECS?`).
//! - Retrieval parameters (`CHUNK_SIZE?`, `CHUNK_OVERLAP?`, `TOP_K?`,
//!   `EMBEDDING_MODEL_ID?`, `EMBEDDING_DIMENSION?`).
//! - Working directory layout (`WORKDIR?` with `uploads/`, `cache/`, `logs/` beneath it).
//! - Proxy behavior (`SERVER_PORT?`, `ALLOWED_ORIGINS?`, `MAX_UPLOAD_BYTES?`,
//!   `MAX_INFLIGHT_TOOL_CALLS?`, `TOOL_CALL_TIMEOUT_SECS?`, `TOOL_SERVER_BIN?`,
//!   `CHILD_RESTART_MAX?`, `CHILD_RESTART_WINDOW_SECS?`).
//! - Tool server identity and limits (`MCP_SERVER_NAME?`, `FULL_DOC_CHAR_CEILING?`).
//!
//! Most fields are optional with sensible defaults; invalid combinations are flagged early
//! with descriptive errors so misconfiguration is easy to diagnose.
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration shared by the proxy and the tool server.
#[derive(Debug)]
pub struct Config {
    /// Bearer token for the remote completion endpoint.
    pub model_api_key: String,
    /// Base URL of the completion endpoint.
    pub model_api_url: String,
    /// Model identifier requested for completions.
    pub model_id: String,
    /// Wall-clock bound for a single completion call, in seconds.
    pub model_timeout_secs: u64,
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters.
    pub chunk_overlap: usize,
    /// Default number of chunks retrieved per question.
    pub top_k: usize,
    /// Identifier recorded in index manifests for the active embedder.
    pub embedding_model_id: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Root of the persisted state layout (`uploads/`, `cache/`, `logs/`).
    pub workdir: PathBuf,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Origins allowed by the CORS layer.
    pub allowed_origins: Vec<String>,
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,
    /// Bound on concurrently outstanding tool calls in the proxy.
    pub max_inflight_tool_calls: usize,
    /// Deadline for a single tool call, in seconds.
    pub tool_call_timeout_secs: u64,
    /// Optional explicit path to the tool-server executable.
    pub tool_server_bin: Option<PathBuf>,
    /// Maximum child restarts tolerated within the restart window.
    pub child_restart_max: u32,
    /// Sliding window for the restart budget, in seconds.
    pub child_restart_window_secs: u64,
    /// Name the tool server reports in its health/identity output.
    pub server_name: String,
    /// Ceiling on full-document analysis; larger documents must use retrieval.
    pub full_doc_char_ceiling: usize,
    /// Whether answers get a second markdown-formatting pass.
    pub format_answers: bool,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let chunk_size = load_usize_with_default("CHUNK_SIZE", 1000)?;
        let chunk_overlap = load_usize_with_default("CHUNK_OVERLAP", 200)?;
        let top_k = load_usize_with_default("TOP_K", 3)?;
        let embedding_dimension = load_usize_with_default("EMBEDDING_DIMENSION", 384)?;

        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue(
                "CHUNK_SIZE must be at least 1".into(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidValue(
                "CHUNK_OVERLAP must be smaller than CHUNK_SIZE".into(),
            ));
        }
        if top_k == 0 {
            return Err(ConfigError::InvalidValue("TOP_K must be at least 1".into()));
        }
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue(
                "EMBEDDING_DIMENSION must be at least 1".into(),
            ));
        }

        Ok(Self {
            model_api_key: load_env("MODEL_API_KEY")?,
            model_api_url: load_env_optional("MODEL_API_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".into()),
            model_id: load_env_optional("MODEL_ID").unwrap_or_else(|| "gpt-4o-mini".into()),
            model_timeout_secs: load_u64_with_default("MODEL_TIMEOUT_SECS", 60)?,
            chunk_size,
            chunk_overlap,
            top_k,
            embedding_model_id: load_env_optional("EMBEDDING_MODEL_ID")
                .unwrap_or_else(|| "hash-embedder-v1".into()),
            embedding_dimension,
            workdir: PathBuf::from(
                load_env_optional("WORKDIR").unwrap_or_else(|| "workdir".into()),
            ),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
            allowed_origins: load_env_optional("ALLOWED_ORIGINS")
                .map(|value| {
                    value
                        .split(',')
                        .map(|origin| origin.trim().to_string())
                        .filter(|origin| !origin.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| vec!["http://localhost:3000".into()]),
            max_upload_bytes: load_usize_with_default("MAX_UPLOAD_BYTES", 50 * 1024 * 1024)?,
            max_inflight_tool_calls: load_usize_with_default("MAX_INFLIGHT_TOOL_CALLS", 32)?,
            tool_call_timeout_secs: load_u64_with_default("TOOL_CALL_TIMEOUT_SECS", 120)?,
            tool_server_bin: load_env_optional("TOOL_SERVER_BIN").map(PathBuf::from),
            child_restart_max: load_u64_with_default("CHILD_RESTART_MAX", 3)? as u32,
            child_restart_window_secs: load_u64_with_default("CHILD_RESTART_WINDOW_SECS", 60)?,
            server_name: load_env_optional("MCP_SERVER_NAME")
                .unwrap_or_else(|| "askpdf-tools".into()),
            full_doc_char_ceiling: load_usize_with_default("FULL_DOC_CHAR_CEILING", 40_000)?,
            format_answers: load_bool_with_default("ANSWER_FORMAT_PASS", true)?,
        })
    }

    /// Directory where uploaded PDFs are persisted.
    pub fn uploads_dir(&self) -> PathBuf {
        self.workdir.join("uploads")
    }

    /// Directory where document indexes are cached.
    pub fn cache_dir(&self) -> PathBuf {
        self.workdir.join("cache")
    }

    /// Directory receiving log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.workdir.join("logs")
    }
}

fn load_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn load_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn load_bool_with_default(key: &str, default: bool) -> Result<bool, ConfigError> {
    match load_env_optional(key) {
        Some(value) => match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        },
        None => Ok(default),
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        model_api_url = %config.model_api_url,
        model_id = %config.model_id,
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        top_k = config.top_k,
        embedding_model_id = %config.embedding_model_id,
        embedding_dimension = config.embedding_dimension,
        workdir = %config.workdir.display(),
        server_port = ?config.server_port,
        max_inflight_tool_calls = config.max_inflight_tool_calls,
        child_restart_max = config.child_restart_max,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
