//! HTTP proxy: tool-server supervision, the handle registry, and the axum surface.

pub mod handles;
pub mod http;
pub mod supervisor;

pub use handles::{HandleRecord, HandleRegistry};
pub use http::{AppState, RouterConfig, create_router};
pub use supervisor::{Supervisor, ToolClient};
