use crate::calc;
use crate::exams;
use crate::ipc::error::ok;
use crate::ipc::helpers::{domain, optional_str, required_str, store_of, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::Student;
use crate::records;
use crate::store::{load_records, Collection};
use serde_json::json;

fn handle_recompute_ranks(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let ranked = domain(req, records::refresh_rankings(store))?;
    Ok(ok(&req.id, json!({ "studentCount": ranked.len() })))
}

fn handle_merit_list(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let form = optional_str(req, "form")?;
    let stream = optional_str(req, "stream")?;

    // Ranked views always read freshly aggregated totals.
    let ranked = domain(req, records::refresh_rankings(store))?;
    let rows: Vec<serde_json::Value> = calc::merit_list(&ranked, form.as_deref(), stream.as_deref())
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            json!({
                "position": i + 1,
                "rank": s.rank,
                "admissionNo": s.admission_no,
                "name": s.name,
                "form": s.form,
                "stream": s.stream,
                "total": s.total.unwrap_or(0),
                "average": s.average.unwrap_or(0.0),
            })
        })
        .collect();
    Ok(ok(
        &req.id,
        json!({
            "filters": { "form": form, "stream": stream },
            "rows": rows
        }),
    ))
}

fn handle_subject_stats(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let subject = required_str(req, "subject")?;
    let students: Vec<Student> = domain(req, load_records(store, Collection::Students))?;
    let stats = calc::subject_stats(&subject, &students);
    Ok(ok(&req.id, json!(stats)))
}

fn handle_subject_averages(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let students: Vec<Student> = domain(req, load_records(store, Collection::Students))?;
    Ok(ok(
        &req.id,
        json!({ "subjects": calc::subject_averages(&students) }),
    ))
}

fn handle_dashboard(state: &AppState, req: &Request) -> HandlerResult {
    let store = store_of(state, req)?;
    let dashboard = domain(req, exams::dashboard(store))?;
    Ok(ok(&req.id, json!(dashboard)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "calc.recomputeRanks" => handle_recompute_ranks(state, req),
        "calc.meritList" => handle_merit_list(state, req),
        "calc.subjectStats" => handle_subject_stats(state, req),
        "calc.subjectAverages" => handle_subject_averages(state, req),
        "calc.dashboard" => handle_dashboard(state, req),
        _ => return None,
    };
    Some(out.unwrap_or_else(|e| e))
}
