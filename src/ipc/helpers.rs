use crate::error::RecordResult;
use crate::ipc::error::{err, record_err};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;

pub type HandlerResult = Result<serde_json::Value, serde_json::Value>;

pub fn store_of<'a>(state: &'a AppState, req: &Request) -> Result<&'a SqliteStore, serde_json::Value> {
    state
        .store
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Missing, null and blank all mean "not provided".
pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("{} must be a string or null", key),
                    None,
                ));
            };
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
    }
}

pub fn optional_bool(req: &Request, key: &str) -> Result<Option<bool>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_bool().map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be a boolean", key),
                None,
            )
        }),
    }
}

/// Lifts a domain result into the handler's response channel.
pub fn domain<T>(req: &Request, r: RecordResult<T>) -> Result<T, serde_json::Value> {
    r.map_err(|e| record_err(&req.id, &e))
}
