use crate::calc::{self, ResultSummary};
use crate::error::{RecordError, RecordResult};
use crate::grading::{self, QuestionReview};
use crate::model::{format_record_id, Exam, ExamResult, Question, Student};
use crate::store::{load_records, save_records, Collection, RecordStore};
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

#[derive(Debug, Clone)]
pub struct NewExam {
    pub title: String,
    pub subject: String,
    pub duration: u32,
    pub questions: Vec<Question>,
    pub created_by: String,
}

pub fn create_exam<S: RecordStore>(store: &S, new: NewExam) -> RecordResult<Exam> {
    grading::validate_exam_definition(&new.title, &new.subject, new.duration, &new.questions)?;
    store.exclusive(|store| {
        let mut exams: Vec<Exam> = load_records(store, Collection::Exams)?;
        let exam = Exam {
            id: format_record_id(store.next_id(Collection::Exams)?),
            title: new.title.trim().to_string(),
            subject: new.subject.trim().to_string(),
            duration: new.duration,
            questions: new.questions,
            created_by: new.created_by.trim().to_string(),
            created_at: Utc::now(),
            active: true,
        };
        exams.push(exam.clone());
        save_records(store, Collection::Exams, &exams)?;
        info!(
            exam_id = %exam.id,
            subject = %exam.subject,
            questions = exam.questions.len(),
            "exam created"
        );
        Ok(exam)
    })
}

pub fn list_exams<S: RecordStore>(store: &S, active_only: bool) -> RecordResult<Vec<Exam>> {
    let exams: Vec<Exam> = load_records(store, Collection::Exams)?;
    Ok(exams
        .into_iter()
        .filter(|e| !active_only || e.active)
        .collect())
}

pub fn get_exam<S: RecordStore>(store: &S, exam_id: &str) -> RecordResult<Exam> {
    let exams: Vec<Exam> = load_records(store, Collection::Exams)?;
    exams
        .into_iter()
        .find(|e| e.id == exam_id)
        .ok_or_else(|| RecordError::not_found("exam", exam_id))
}

/// The only mutation an exam accepts after creation.
pub fn set_exam_active<S: RecordStore>(
    store: &S,
    exam_id: &str,
    active: bool,
) -> RecordResult<Exam> {
    store.exclusive(|store| {
        let mut exams: Vec<Exam> = load_records(store, Collection::Exams)?;
        let exam = exams
            .iter_mut()
            .find(|e| e.id == exam_id)
            .ok_or_else(|| RecordError::not_found("exam", exam_id))?;
        exam.active = active;
        let updated = exam.clone();
        save_records(store, Collection::Exams, &exams)?;
        Ok(updated)
    })
}

/// Grades and appends a submission.
///
/// Results are append-only: a second submission for the same student and
/// exam is rejected rather than replacing the first.
pub fn submit_result<S: RecordStore>(
    store: &S,
    student_id: &str,
    exam_id: &str,
    answers: BTreeMap<String, String>,
) -> RecordResult<ExamResult> {
    store.exclusive(|store| {
        let students: Vec<Student> = load_records(store, Collection::Students)?;
        if !students.iter().any(|s| s.admission_no == student_id) {
            return Err(RecordError::not_found("student", student_id));
        }
        let exam = get_exam(store, exam_id)?;

        let mut results: Vec<ExamResult> = load_records(store, Collection::Results)?;
        if results
            .iter()
            .any(|r| r.student_id == student_id && r.exam_id == exam_id)
        {
            return Err(RecordError::duplicate(
                "result",
                format!("{student_id}/{exam_id}"),
            ));
        }

        let outcome = grading::grade(&exam, &answers)?;
        let result = ExamResult {
            id: format_record_id(store.next_id(Collection::Results)?),
            student_id: student_id.to_string(),
            exam_id: exam_id.to_string(),
            answers,
            score: outcome.score,
            total_questions: outcome.total_questions,
            percentage: outcome.percentage,
            submitted_at: Utc::now(),
        };
        results.push(result.clone());
        save_records(store, Collection::Results, &results)?;
        info!(
            result_id = %result.id,
            student_id,
            exam_id,
            score = result.score,
            percentage = result.percentage,
            "result submitted"
        );
        Ok(result)
    })
}

pub fn list_results<S: RecordStore>(
    store: &S,
    student_id: Option<&str>,
    exam_id: Option<&str>,
) -> RecordResult<Vec<ExamResult>> {
    let results: Vec<ExamResult> = load_records(store, Collection::Results)?;
    Ok(results
        .into_iter()
        .filter(|r| student_id.map(|s| r.student_id == s).unwrap_or(true))
        .filter(|r| exam_id.map(|e| r.exam_id == e).unwrap_or(true))
        .collect())
}

/// A stored result with the title and subject of the exam it belongs to.
/// Both are `None` if the exam record has gone missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultWithExam {
    #[serde(flatten)]
    pub result: ExamResult,
    pub exam_title: Option<String>,
    pub exam_subject: Option<String>,
}

pub fn list_results_with_exams<S: RecordStore>(
    store: &S,
    student_id: Option<&str>,
    exam_id: Option<&str>,
) -> RecordResult<Vec<ResultWithExam>> {
    let exams: Vec<Exam> = load_records(store, Collection::Exams)?;
    let by_id: HashMap<&str, &Exam> = exams.iter().map(|e| (e.id.as_str(), e)).collect();
    Ok(list_results(store, student_id, exam_id)?
        .into_iter()
        .map(|result| {
            let exam = by_id.get(result.exam_id.as_str());
            ResultWithExam {
                exam_title: exam.map(|e| e.title.clone()),
                exam_subject: exam.map(|e| e.subject.clone()),
                result,
            }
        })
        .collect())
}

/// One row of an exam's results table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamStanding {
    #[serde(flatten)]
    pub result: ExamResult,
    pub student_name: Option<String>,
    pub form: Option<String>,
    pub stream: Option<String>,
}

/// Results for one exam, best score first.
///
/// Equal scores keep submission order. Student details are `None` for a
/// result whose student has since been deleted.
pub fn exam_results<S: RecordStore>(
    store: &S,
    exam_id: &str,
) -> RecordResult<Vec<ExamStanding>> {
    get_exam(store, exam_id)?;
    let students: Vec<Student> = load_records(store, Collection::Students)?;
    let by_admission: HashMap<&str, &Student> = students
        .iter()
        .map(|s| (s.admission_no.as_str(), s))
        .collect();
    let mut rows: Vec<ExamStanding> = list_results(store, None, Some(exam_id))?
        .into_iter()
        .map(|result| {
            let student = by_admission.get(result.student_id.as_str());
            ExamStanding {
                student_name: student.map(|s| s.name.clone()),
                form: student.map(|s| s.form.clone()),
                stream: student.map(|s| s.stream.clone()),
                result,
            }
        })
        .collect();
    rows.sort_by(|a, b| b.result.score.cmp(&a.result.score));
    Ok(rows)
}

/// Active exams the student has not submitted yet, in creation order.
pub fn available_exams<S: RecordStore>(
    store: &S,
    student_id: &str,
) -> RecordResult<Vec<Exam>> {
    let students: Vec<Student> = load_records(store, Collection::Students)?;
    if !students.iter().any(|s| s.admission_no == student_id) {
        return Err(RecordError::not_found("student", student_id));
    }
    let taken: Vec<String> = list_results(store, Some(student_id), None)?
        .into_iter()
        .map(|r| r.exam_id)
        .collect();
    Ok(list_exams(store, true)?
        .into_iter()
        .filter(|e| !taken.contains(&e.id))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub student_count: usize,
    pub exam_count: usize,
    pub active_exam_count: usize,
    #[serde(flatten)]
    pub results: ResultSummary,
}

pub fn dashboard<S: RecordStore>(store: &S) -> RecordResult<Dashboard> {
    let students: Vec<Student> = load_records(store, Collection::Students)?;
    let exams: Vec<Exam> = load_records(store, Collection::Exams)?;
    let results = list_results(store, None, None)?;
    Ok(Dashboard {
        student_count: students.len(),
        exam_count: exams.len(),
        active_exam_count: exams.iter().filter(|e| e.active).count(),
        results: calc::result_summary(&results),
    })
}

pub fn get_result_with_review<S: RecordStore>(
    store: &S,
    result_id: &str,
) -> RecordResult<(ExamResult, Vec<QuestionReview>)> {
    let results: Vec<ExamResult> = load_records(store, Collection::Results)?;
    let result = results
        .into_iter()
        .find(|r| r.id == result_id)
        .ok_or_else(|| RecordError::not_found("result", result_id))?;
    let exam = get_exam(store, &result.exam_id)?;
    let review = grading::review(&exam, &result.answers);
    Ok((result, review))
}
