use crate::calc::round_2_decimal;
use crate::error::{RecordError, RecordResult};
use crate::model::{Exam, Question, OPTION_LETTERS};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
    pub score: u32,
    pub total_questions: u32,
    pub percentage: f64,
}

/// Scores a submission against the exam's answer key.
///
/// Answers are looked up by question index rendered as a decimal string and
/// compared case-sensitively. Missing or unknown answers score nothing, and
/// keys that name no question are ignored: the denominator is always the
/// exam's own question count.
pub fn grade(exam: &Exam, answers: &BTreeMap<String, String>) -> RecordResult<GradeOutcome> {
    let total_questions = exam.questions.len() as u32;
    if total_questions == 0 {
        return Err(RecordError::DivisionByZero("exam percentage"));
    }
    let score = exam
        .questions
        .iter()
        .enumerate()
        .filter(|(i, q)| answers.get(&i.to_string()) == Some(&q.correct_answer))
        .count() as u32;
    let percentage = round_2_decimal(score as f64 / total_questions as f64 * 100.0);
    Ok(GradeOutcome {
        score,
        total_questions,
        percentage,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionReview {
    pub index: usize,
    pub text: String,
    pub chosen: Option<String>,
    pub correct_answer: String,
    pub is_correct: bool,
}

pub fn review(exam: &Exam, answers: &BTreeMap<String, String>) -> Vec<QuestionReview> {
    exam.questions
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let chosen = answers.get(&i.to_string()).cloned();
            QuestionReview {
                index: i,
                text: q.text.clone(),
                is_correct: chosen.as_deref() == Some(q.correct_answer.as_str()),
                chosen,
                correct_answer: q.correct_answer.clone(),
            }
        })
        .collect()
}

/// Rejects exams that could not be graded or displayed.
///
/// An empty question list is refused here so grading never sees a zero
/// denominator.
pub fn validate_exam_definition(
    title: &str,
    subject: &str,
    duration: u32,
    questions: &[Question],
) -> RecordResult<()> {
    if title.trim().is_empty() {
        return Err(RecordError::malformed("title must not be empty"));
    }
    if subject.trim().is_empty() {
        return Err(RecordError::malformed("subject must not be empty"));
    }
    if duration == 0 {
        return Err(RecordError::malformed("duration must be > 0 minutes"));
    }
    if questions.is_empty() {
        return Err(RecordError::malformed("exam must have at least one question"));
    }
    for (i, q) in questions.iter().enumerate() {
        if q.text.trim().is_empty() {
            return Err(RecordError::malformed(format!(
                "questions[{i}].text must not be empty"
            )));
        }
        for letter in OPTION_LETTERS {
            let present = q
                .options
                .get(letter)
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false);
            if !present {
                return Err(RecordError::malformed(format!(
                    "questions[{i}].options.{letter} is required"
                )));
            }
        }
        if q.options.len() != OPTION_LETTERS.len() {
            return Err(RecordError::malformed(format!(
                "questions[{i}].options must contain exactly A, B, C, D"
            )));
        }
        if !OPTION_LETTERS.contains(&q.correct_answer.as_str()) {
            return Err(RecordError::malformed(format!(
                "questions[{i}].correctAnswer must be one of A, B, C, D"
            )));
        }
    }
    Ok(())
}
