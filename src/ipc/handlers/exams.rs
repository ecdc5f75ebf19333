use crate::exams::{self, NewExam};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    domain, optional_bool, optional_str, required_str, store_of, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Exam, Question};
use serde_json::json;
use std::collections::BTreeMap;

// Listing never exposes answer keys.
fn exam_summary(e: &Exam) -> serde_json::Value {
    json!({
        "id": e.id,
        "title": e.title,
        "subject": e.subject,
        "duration": e.duration,
        "questionCount": e.questions.len(),
        "createdBy": e.created_by,
        "createdAt": e.created_at,
        "active": e.active,
    })
}

fn handle_exams_create(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let title = required_str(req, "title")?;
    let subject = required_str(req, "subject")?;
    let created_by = required_str(req, "createdBy")?;
    let duration = match req.params.get("duration").and_then(|v| v.as_u64()) {
        Some(d) => u32::try_from(d).map_err(|_| {
            err(&req.id, "bad_params", "duration is too large", None)
        })?,
        None => {
            return Err(err(
                &req.id,
                "bad_params",
                "duration must be a whole number of minutes",
                None,
            ))
        }
    };
    let Some(raw_questions) = req.params.get("questions") else {
        return Err(err(&req.id, "bad_params", "missing questions", None));
    };
    let questions: Vec<Question> = serde_json::from_value(raw_questions.clone()).map_err(|e| {
        err(
            &req.id,
            "bad_params",
            format!("questions are malformed: {}", e),
            None,
        )
    })?;

    let exam = domain(
        req,
        exams::create_exam(
            store,
            NewExam {
                title,
                subject,
                duration,
                questions,
                created_by,
            },
        ),
    )?;
    Ok(ok(&req.id, json!({ "exam": exam })))
}

fn handle_exams_list(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let active_only = optional_bool(req, "activeOnly")?.unwrap_or(false);
    let list = domain(req, exams::list_exams(store, active_only))?;
    let rows: Vec<serde_json::Value> = list.iter().map(exam_summary).collect();
    Ok(ok(&req.id, json!({ "exams": rows })))
}

fn handle_exams_get(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let exam_id = required_str(req, "examId")?;
    let include_answers = optional_bool(req, "includeAnswers")?.unwrap_or(false);
    let exam = domain(req, exams::get_exam(store, &exam_id))?;
    let mut value = json!(exam);
    if !include_answers {
        if let Some(questions) = value.get_mut("questions").and_then(|v| v.as_array_mut()) {
            for q in questions.iter_mut().filter_map(|q| q.as_object_mut()) {
                q.remove("correctAnswer");
            }
        }
    }
    Ok(ok(&req.id, json!({ "exam": value })))
}

fn handle_exams_set_active(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let exam_id = required_str(req, "examId")?;
    let Some(active) = optional_bool(req, "active")? else {
        return Err(err(&req.id, "bad_params", "missing active", None));
    };
    let exam = domain(req, exams::set_exam_active(store, &exam_id, active))?;
    Ok(ok(&req.id, json!({ "exam": exam_summary(&exam) })))
}

fn answers_param(req: &Request) -> Result<BTreeMap<String, String>, serde_json::Value> {
    let Some(raw) = req.params.get("answers").and_then(|v| v.as_object()) else {
        return Err(err(&req.id, "bad_params", "answers must be an object", None));
    };
    let mut out = BTreeMap::new();
    for (k, v) in raw {
        let Some(letter) = v.as_str() else {
            return Err(err(
                &req.id,
                "bad_params",
                "answers values must be option letters",
                Some(json!({ "question": k })),
            ));
        };
        out.insert(k.clone(), letter.to_string());
    }
    Ok(out)
}

fn handle_results_submit(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let exam_id = required_str(req, "examId")?;
    let answers = answers_param(req)?;
    let result = domain(
        req,
        exams::submit_result(store, &student_id, &exam_id, answers),
    )?;
    Ok(ok(&req.id, json!({ "result": result })))
}

fn handle_results_list(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let student_id = optional_str(req, "studentId")?;
    let exam_id = optional_str(req, "examId")?;
    let results = domain(
        req,
        exams::list_results_with_exams(store, student_id.as_deref(), exam_id.as_deref()),
    )?;
    Ok(ok(&req.id, json!({ "results": results })))
}

fn handle_results_for_exam(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let exam_id = required_str(req, "examId")?;
    let exam = domain(req, exams::get_exam(store, &exam_id))?;
    let rows = domain(req, exams::exam_results(store, &exam_id))?;
    Ok(ok(
        &req.id,
        json!({ "exam": exam_summary(&exam), "results": rows }),
    ))
}

fn handle_exams_available(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let list = domain(req, exams::available_exams(store, &student_id))?;
    let rows: Vec<serde_json::Value> = list.iter().map(exam_summary).collect();
    Ok(ok(&req.id, json!({ "exams": rows })))
}

fn handle_results_get(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let result_id = required_str(req, "resultId")?;
    let (result, review) = domain(req, exams::get_result_with_review(store, &result_id))?;
    Ok(ok(&req.id, json!({ "result": result, "review": review })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "exams.create" => handle_exams_create(state, req),
        "exams.list" => handle_exams_list(state, req),
        "exams.get" => handle_exams_get(state, req),
        "exams.setActive" => handle_exams_set_active(state, req),
        "exams.available" => handle_exams_available(state, req),
        "results.submit" => handle_results_submit(state, req),
        "results.list" => handle_results_list(state, req),
        "results.forExam" => handle_results_for_exam(state, req),
        "results.get" => handle_results_get(state, req),
        _ => return None,
    };
    Some(out.unwrap_or_else(|e| e))
}
