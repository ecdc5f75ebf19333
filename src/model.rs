use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const OPTION_LETTERS: [&str; 4] = ["A", "B", "C", "D"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Compulsory,
    Optional,
}

impl SubjectType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compulsory" => Some(Self::Compulsory),
            "optional" => Some(Self::Optional),
            _ => None,
        }
    }
}

/// One recorded subject score.
///
/// `score` has no serde default: a stored mark without it is a broken
/// record and must fail to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    pub score: i64,
    #[serde(default)]
    pub comment: String,
    /// Classified once when the mark was written; never recomputed.
    #[serde(default)]
    pub sentiment: Sentiment,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subjects {
    #[serde(default)]
    pub compulsory: BTreeMap<String, Mark>,
    #[serde(default)]
    pub optional: BTreeMap<String, Mark>,
}

impl Subjects {
    pub fn of_type_mut(&mut self, subject_type: SubjectType) -> &mut BTreeMap<String, Mark> {
        match subject_type {
            SubjectType::Compulsory => &mut self.compulsory,
            SubjectType::Optional => &mut self.optional,
        }
    }

    /// Every mark across both subject types, compulsory first.
    pub fn all_marks(&self) -> impl Iterator<Item = (&String, &Mark)> {
        self.compulsory.iter().chain(self.optional.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub admission_no: String,
    pub name: String,
    pub form: String,
    pub stream: String,
    #[serde(default)]
    pub subjects: Subjects,
    // Derived by the aggregation pass; stale between passes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
}

impl Student {
    pub fn new(admission_no: &str, name: &str, form: &str, stream: &str) -> Self {
        Self {
            admission_no: admission_no.to_string(),
            name: name.to_string(),
            form: form.to_string(),
            stream: stream.to_string(),
            subjects: Subjects::default(),
            total: None,
            average: None,
            rank: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub subjects: Vec<String>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub text: String,
    pub options: BTreeMap<String, String>,
    pub correct_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    pub title: String,
    pub subject: String,
    /// Minutes.
    pub duration: u32,
    pub questions: Vec<Question>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub id: String,
    pub student_id: String,
    pub exam_id: String,
    /// Question index (as a decimal string) to chosen option letter.
    pub answers: BTreeMap<String, String>,
    pub score: u32,
    pub total_questions: u32,
    pub percentage: f64,
    pub submitted_at: DateTime<Utc>,
}

/// Zero-padded record id, e.g. `7 -> "007"`.
pub fn format_record_id(n: u64) -> String {
    format!("{:03}", n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids_are_zero_padded() {
        assert_eq!(format_record_id(1), "001");
        assert_eq!(format_record_id(42), "042");
        assert_eq!(format_record_id(1234), "1234");
    }

    #[test]
    fn mark_without_score_is_rejected() {
        let raw = serde_json::json!({ "comment": "good work" });
        assert!(serde_json::from_value::<Mark>(raw).is_err());
    }

    #[test]
    fn student_without_derived_fields_deserializes() {
        let raw = serde_json::json!({
            "admissionNo": "A1",
            "name": "Amina",
            "form": "2",
            "stream": "A",
            "subjects": { "compulsory": { "Math": { "score": 70 } } }
        });
        let s: Student = serde_json::from_value(raw).expect("parse student");
        assert_eq!(s.total, None);
        assert_eq!(s.subjects.compulsory["Math"].sentiment, Sentiment::Neutral);
        assert!(s.subjects.optional.is_empty());
    }
}
