//! Tool handlers. Each handler validates its arguments at the boundary and returns
//! either a JSON result or an [`RpcError`] carrying the failure classification.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::rpc::RpcError;

pub mod answer;
pub mod extract;
pub mod manage;
pub mod summarize;

/// Deserialize the arguments object into the handler's typed request.
pub(crate) fn parse_arguments<T: DeserializeOwned>(arguments: Option<Value>) -> Result<T, RpcError> {
    let value = arguments.unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    serde_json::from_value(value)
        .map_err(|err| RpcError::invalid_params(format!("Invalid arguments: {err}")))
}

/// Reject empty or whitespace-only required string fields.
pub(crate) fn require_non_empty(value: &str, field: &str) -> Result<(), RpcError> {
    if value.trim().is_empty() {
        return Err(RpcError::invalid_params(format!(
            "`{field}` must not be empty"
        )));
    }
    Ok(())
}
