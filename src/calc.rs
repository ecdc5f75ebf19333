use crate::model::{ExamResult, Student};
use serde::Serialize;
use std::collections::BTreeMap;

/// 2-decimal rounding used for averages and percentages.
///
/// Exact binary halves go to the even neighbour, so 100.125 becomes 100.12
/// and 100.625 becomes 100.62, the same as the stored gradebook data.
pub fn round_2_decimal(x: f64) -> f64 {
    (x * 100.0).round_ties_even() / 100.0
}

/// 1-decimal rounding for dashboard percentages, ties to even.
pub fn round_1_decimal(x: f64) -> f64 {
    (x * 10.0).round_ties_even() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct StudentTotals {
    total: i64,
    average: f64,
}

fn student_totals(student: &Student) -> StudentTotals {
    let mut total = 0_i64;
    let mut mark_count = 0_usize;
    for (_, mark) in student.subjects.all_marks() {
        total += mark.score;
        mark_count += 1;
    }
    let average = if mark_count > 0 {
        round_2_decimal(total as f64 / mark_count as f64)
    } else {
        0.0
    };
    StudentTotals { total, average }
}

/// Recomputes `total`, `average` and `rank` for every student.
///
/// The returned list is reordered by total descending. `sort_by` is stable,
/// so students with equal totals keep their storage order and that order is
/// the only tie-break. Ranks are the 1-based positions in the new order and
/// are always a contiguous 1..=N permutation.
pub fn recompute(mut students: Vec<Student>) -> Vec<Student> {
    for s in students.iter_mut() {
        let totals = student_totals(s);
        s.total = Some(totals.total);
        s.average = Some(totals.average);
    }
    students.sort_by(|a, b| b.total.unwrap_or(0).cmp(&a.total.unwrap_or(0)));
    for (i, s) in students.iter_mut().enumerate() {
        s.rank = Some(i + 1);
    }
    students
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStats {
    pub count: usize,
    pub average: f64,
    pub highest: i64,
    pub lowest: i64,
}

impl SubjectStats {
    pub const EMPTY: SubjectStats = SubjectStats {
        count: 0,
        average: 0.0,
        highest: 0,
        lowest: 0,
    };
}

/// Count/average/max/min of one subject's scores across the population.
///
/// A student holding the subject under both subject types contributes both
/// scores. No matching marks yields [`SubjectStats::EMPTY`].
pub fn subject_stats(subject_name: &str, students: &[Student]) -> SubjectStats {
    let scores: Vec<i64> = students
        .iter()
        .flat_map(|s| s.subjects.all_marks())
        .filter(|(name, _)| name.as_str() == subject_name)
        .map(|(_, mark)| mark.score)
        .collect();
    stats_from_scores(&scores)
}

fn stats_from_scores(scores: &[i64]) -> SubjectStats {
    let (Some(highest), Some(lowest)) = (scores.iter().max(), scores.iter().min()) else {
        return SubjectStats::EMPTY;
    };
    let sum: i64 = scores.iter().sum();
    SubjectStats {
        count: scores.len(),
        average: round_2_decimal(sum as f64 / scores.len() as f64),
        highest: *highest,
        lowest: *lowest,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub subject: String,
    pub count: usize,
    pub average: f64,
}

/// Per-subject class averages for the overview chart, sorted by subject name.
pub fn subject_averages(students: &[Student]) -> Vec<SubjectAverage> {
    let mut by_subject: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
    for (name, mark) in students.iter().flat_map(|s| s.subjects.all_marks()) {
        by_subject.entry(name.as_str()).or_default().push(mark.score);
    }
    by_subject
        .into_iter()
        .map(|(subject, scores)| {
            let stats = stats_from_scores(&scores);
            SubjectAverage {
                subject: subject.to_string(),
                count: stats.count,
                average: stats.average,
            }
        })
        .collect()
}

/// Filtered leaderboard view.
///
/// Keeps students whose form/stream equal the given filters (a missing
/// filter matches everyone) and orders them by total descending, stable on
/// input order. A missing `total` counts as 0. Stored `rank` values are left
/// untouched: they describe the unfiltered population.
pub fn merit_list<'a>(
    students: &'a [Student],
    form: Option<&str>,
    stream: Option<&str>,
) -> Vec<&'a Student> {
    let mut rows: Vec<&Student> = students
        .iter()
        .filter(|s| form.map(|f| s.form == f).unwrap_or(true))
        .filter(|s| stream.map(|st| s.stream == st).unwrap_or(true))
        .collect();
    rows.sort_by(|a, b| b.total.unwrap_or(0).cmp(&a.total.unwrap_or(0)));
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPerformance {
    pub student_id: String,
    pub result_count: usize,
    pub average_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub result_count: usize,
    pub average_percentage: f64,
    pub students: Vec<StudentPerformance>,
}

fn mean_percentage(percentages: &[f64]) -> f64 {
    if percentages.is_empty() {
        return 0.0;
    }
    round_1_decimal(percentages.iter().sum::<f64>() / percentages.len() as f64)
}

/// Overall and per-student mean exam percentage, one decimal place.
///
/// Students appear in admission-number order and only once they have a
/// result. No results gives a zero overall mean.
pub fn result_summary(results: &[ExamResult]) -> ResultSummary {
    let mut by_student: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for r in results {
        by_student
            .entry(r.student_id.as_str())
            .or_default()
            .push(r.percentage);
    }
    let all: Vec<f64> = results.iter().map(|r| r.percentage).collect();
    ResultSummary {
        result_count: results.len(),
        average_percentage: mean_percentage(&all),
        students: by_student
            .into_iter()
            .map(|(student_id, percentages)| StudentPerformance {
                student_id: student_id.to_string(),
                result_count: percentages.len(),
                average_percentage: mean_percentage(&percentages),
            })
            .collect(),
    }
}
