use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{domain, required_str, store_of, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::records;
use serde_json::json;

fn handle_teachers_register(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let username = required_str(req, "username")?;
    let name = required_str(req, "name")?;
    let subjects = match req.params.get("subjects") {
        None => Vec::new(),
        Some(v) if v.is_null() => Vec::new(),
        Some(v) => {
            let Some(items) = v.as_array() else {
                return Err(err(&req.id, "bad_params", "subjects must be an array", None));
            };
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let Some(s) = item.as_str() else {
                    return Err(err(
                        &req.id,
                        "bad_params",
                        "subjects must contain only strings",
                        None,
                    ));
                };
                out.push(s.to_string());
            }
            out
        }
    };
    let teacher = domain(
        req,
        records::register_teacher(store, &username, &name, subjects),
    )?;
    Ok(ok(&req.id, json!({ "teacher": teacher })))
}

fn handle_teachers_list(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let teachers = domain(req, records::list_teachers(store))?;
    Ok(ok(&req.id, json!({ "teachers": teachers })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "teachers.register" => handle_teachers_register(state, req),
        "teachers.list" => handle_teachers_list(state, req),
        _ => return None,
    };
    Some(out.unwrap_or_else(|e| e))
}
