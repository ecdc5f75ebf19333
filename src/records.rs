use crate::calc;
use crate::error::{RecordError, RecordResult};
use crate::model::{Mark, Student, SubjectType, Teacher};
use crate::sentiment;
use crate::store::{load_records, save_records, Collection, RecordStore};
use chrono::Utc;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub form: Option<String>,
    pub stream: Option<String>,
}

fn required(field: &str, value: &str) -> RecordResult<String> {
    let t = value.trim();
    if t.is_empty() {
        return Err(RecordError::malformed(format!("{field} must not be empty")));
    }
    Ok(t.to_string())
}

fn position_of(students: &[Student], admission_no: &str) -> RecordResult<usize> {
    students
        .iter()
        .position(|s| s.admission_no == admission_no)
        .ok_or_else(|| RecordError::not_found("student", admission_no))
}

pub fn list_students<S: RecordStore>(
    store: &S,
    form: Option<&str>,
    stream: Option<&str>,
) -> RecordResult<Vec<Student>> {
    let students: Vec<Student> = load_records(store, Collection::Students)?;
    Ok(students
        .into_iter()
        .filter(|s| form.map(|f| s.form == f).unwrap_or(true))
        .filter(|s| stream.map(|st| s.stream == st).unwrap_or(true))
        .collect())
}

pub fn get_student<S: RecordStore>(store: &S, admission_no: &str) -> RecordResult<Student> {
    let students: Vec<Student> = load_records(store, Collection::Students)?;
    let idx = position_of(&students, admission_no)?;
    Ok(students[idx].clone())
}

pub fn enroll_student<S: RecordStore>(
    store: &S,
    admission_no: &str,
    name: &str,
    form: &str,
    stream: &str,
) -> RecordResult<Student> {
    let admission_no = required("admissionNo", admission_no)?;
    let name = required("name", name)?;
    store.exclusive(|store| {
        let mut students: Vec<Student> = load_records(store, Collection::Students)?;
        if students.iter().any(|s| s.admission_no == admission_no) {
            return Err(RecordError::duplicate("student", admission_no.clone()));
        }
        let student = Student::new(&admission_no, &name, form.trim(), stream.trim());
        students.push(student.clone());
        save_records(store, Collection::Students, &students)?;
        info!(admission_no = %student.admission_no, "student enrolled");
        Ok(student)
    })
}

pub fn update_student<S: RecordStore>(
    store: &S,
    admission_no: &str,
    patch: StudentPatch,
) -> RecordResult<Student> {
    let name = patch.name.as_deref().map(|n| required("name", n)).transpose()?;
    store.exclusive(|store| {
        let mut students: Vec<Student> = load_records(store, Collection::Students)?;
        let idx = position_of(&students, admission_no)?;
        let s = &mut students[idx];
        if let Some(name) = name {
            s.name = name;
        }
        if let Some(form) = patch.form {
            s.form = form.trim().to_string();
        }
        if let Some(stream) = patch.stream {
            s.stream = stream.trim().to_string();
        }
        let updated = s.clone();
        save_records(store, Collection::Students, &students)?;
        Ok(updated)
    })
}

pub fn delete_student<S: RecordStore>(store: &S, admission_no: &str) -> RecordResult<()> {
    store.exclusive(|store| {
        let mut students: Vec<Student> = load_records(store, Collection::Students)?;
        let idx = position_of(&students, admission_no)?;
        students.remove(idx);
        save_records(store, Collection::Students, &students)?;
        info!(admission_no, "student deleted");
        Ok(())
    })
}

#[derive(Debug, Clone)]
pub struct MarkInput {
    pub subject_type: SubjectType,
    pub subject: String,
    pub score: i64,
    pub comment: String,
    /// Supplied by the host's sentiment scorer.
    pub polarity: f64,
}

/// Records (or replaces) one subject mark. The sentiment label is fixed here
/// from the supplied polarity and stays with the mark from then on.
pub fn set_mark<S: RecordStore>(
    store: &S,
    admission_no: &str,
    input: MarkInput,
) -> RecordResult<Mark> {
    let subject = required("subject", &input.subject)?;
    if input.score < 0 {
        return Err(RecordError::malformed("score must be >= 0"));
    }
    let mark = Mark {
        score: input.score,
        comment: input.comment.trim().to_string(),
        sentiment: sentiment::classify(input.polarity),
    };
    store.exclusive(|store| {
        let mut students: Vec<Student> = load_records(store, Collection::Students)?;
        let idx = position_of(&students, admission_no)?;
        students[idx]
            .subjects
            .of_type_mut(input.subject_type)
            .insert(subject.clone(), mark.clone());
        save_records(store, Collection::Students, &students)?;
        Ok(mark.clone())
    })
}

pub fn delete_mark<S: RecordStore>(
    store: &S,
    admission_no: &str,
    subject_type: SubjectType,
    subject: &str,
) -> RecordResult<()> {
    store.exclusive(|store| {
        let mut students: Vec<Student> = load_records(store, Collection::Students)?;
        let idx = position_of(&students, admission_no)?;
        if students[idx]
            .subjects
            .of_type_mut(subject_type)
            .remove(subject)
            .is_none()
        {
            return Err(RecordError::not_found(
                "mark",
                format!("{admission_no}/{subject}"),
            ));
        }
        save_records(store, Collection::Students, &students)?;
        Ok(())
    })
}

/// Runs the aggregation pass and persists the reordered, ranked collection.
///
/// Ranking pages call this first so stored `total`/`average`/`rank` are
/// current when they are read.
pub fn refresh_rankings<S: RecordStore>(store: &S) -> RecordResult<Vec<Student>> {
    store.exclusive(|store| {
        let students: Vec<Student> = load_records(store, Collection::Students)?;
        let ranked = calc::recompute(students);
        save_records(store, Collection::Students, &ranked)?;
        info!(students = ranked.len(), "ranks recomputed");
        Ok(ranked)
    })
}

pub fn register_teacher<S: RecordStore>(
    store: &S,
    username: &str,
    name: &str,
    subjects: Vec<String>,
) -> RecordResult<Teacher> {
    let username = required("username", username)?;
    let name = required("name", name)?;
    store.exclusive(|store| {
        let mut teachers: Vec<Teacher> = load_records(store, Collection::Teachers)?;
        if teachers.iter().any(|t| t.username == username) {
            return Err(RecordError::duplicate("teacher", username.clone()));
        }
        let teacher = Teacher {
            username: username.clone(),
            name: name.clone(),
            subjects: subjects
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            registered_at: Utc::now(),
        };
        teachers.push(teacher.clone());
        save_records(store, Collection::Teachers, &teachers)?;
        info!(username = %teacher.username, "teacher registered");
        Ok(teacher)
    })
}

pub fn list_teachers<S: RecordStore>(store: &S) -> RecordResult<Vec<Teacher>> {
    load_records(store, Collection::Teachers)
}
