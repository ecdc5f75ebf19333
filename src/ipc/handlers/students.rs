use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{domain, optional_str, required_str, store_of, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::SubjectType;
use crate::records::{self, MarkInput, StudentPatch};
use serde_json::json;

fn handle_students_list(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let form = optional_str(req, "form")?;
    let stream = optional_str(req, "stream")?;
    let students = domain(
        req,
        records::list_students(store, form.as_deref(), stream.as_deref()),
    )?;
    Ok(ok(&req.id, json!({ "students": students })))
}

fn handle_students_get(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let admission_no = required_str(req, "admissionNo")?;
    let student = domain(req, records::get_student(store, &admission_no))?;
    Ok(ok(&req.id, json!({ "student": student })))
}

fn handle_students_enroll(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let admission_no = required_str(req, "admissionNo")?;
    let name = required_str(req, "name")?;
    let form = required_str(req, "form")?;
    let stream = required_str(req, "stream")?;
    let student = domain(
        req,
        records::enroll_student(store, &admission_no, &name, &form, &stream),
    )?;
    Ok(ok(&req.id, json!({ "student": student })))
}

fn patch_field(
    req: &Request,
    patch: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<Option<String>, serde_json::Value> {
    match patch.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_str().map(|s| Some(s.to_string())).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("patch.{} must be a string", key),
                None,
            )
        }),
    }
}

fn handle_students_update(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let admission_no = required_str(req, "admissionNo")?;
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(err(&req.id, "bad_params", "missing patch", None));
    };
    let patch = StudentPatch {
        name: patch_field(req, patch, "name")?,
        form: patch_field(req, patch, "form")?,
        stream: patch_field(req, patch, "stream")?,
    };
    let student = domain(req, records::update_student(store, &admission_no, patch))?;
    Ok(ok(&req.id, json!({ "student": student })))
}

fn handle_students_delete(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let admission_no = required_str(req, "admissionNo")?;
    domain(req, records::delete_student(store, &admission_no))?;
    Ok(ok(&req.id, json!({ "ok": true })))
}

fn subject_type_param(req: &Request) -> Result<SubjectType, serde_json::Value> {
    let raw = required_str(req, "subjectType")?;
    SubjectType::parse(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "subjectType must be one of: compulsory, optional",
            Some(json!({ "subjectType": raw })),
        )
    })
}

fn handle_marks_set(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let admission_no = required_str(req, "admissionNo")?;
    let subject_type = subject_type_param(req)?;
    let subject = required_str(req, "subject")?;
    let Some(score) = req.params.get("score").and_then(|v| v.as_i64()) else {
        return Err(err(
            &req.id,
            "bad_params",
            "score must be an integer",
            req.params.get("score").map(|v| json!({ "score": v })),
        ));
    };
    let comment = optional_str(req, "comment")?.unwrap_or_default();
    let polarity = match req.params.get("polarity") {
        None => 0.0,
        Some(v) if v.is_null() => 0.0,
        Some(v) => match v.as_f64() {
            Some(p) if (-1.0..=1.0).contains(&p) => p,
            _ => {
                return Err(err(
                    &req.id,
                    "bad_params",
                    "polarity must be a number in [-1, 1]",
                    Some(json!({ "polarity": v })),
                ))
            }
        },
    };

    let mark = domain(
        req,
        records::set_mark(
            store,
            &admission_no,
            MarkInput {
                subject_type,
                subject,
                score,
                comment,
                polarity,
            },
        ),
    )?;
    Ok(ok(&req.id, json!({ "mark": mark })))
}

fn handle_marks_delete(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let admission_no = required_str(req, "admissionNo")?;
    let subject_type = subject_type_param(req)?;
    let subject = required_str(req, "subject")?;
    domain(
        req,
        records::delete_mark(store, &admission_no, subject_type, &subject),
    )?;
    Ok(ok(&req.id, json!({ "ok": true })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "students.list" => handle_students_list(state, req),
        "students.get" => handle_students_get(state, req),
        "students.enroll" => handle_students_enroll(state, req),
        "students.update" => handle_students_update(state, req),
        "students.delete" => handle_students_delete(state, req),
        "marks.set" => handle_marks_set(state, req),
        "marks.delete" => handle_marks_delete(state, req),
        _ => return None,
    };
    Some(out.unwrap_or_else(|e| e))
}
