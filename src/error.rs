use serde_json::json;

/// Recoverable failures surfaced by the record engine.
///
/// Each variant maps to a stable wire code so the host can branch on it
/// without parsing messages.
#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("{kind} already exists: {key}")]
    DuplicateKey { kind: &'static str, key: String },
    #[error("{0}")]
    MalformedInput(String),
    #[error("cannot compute {0}: denominator is zero")]
    DivisionByZero(&'static str),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl RecordError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn duplicate(kind: &'static str, key: impl Into<String>) -> Self {
        Self::DuplicateKey {
            kind,
            key: key.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::DuplicateKey { .. } => "duplicate_key",
            Self::MalformedInput(_) => "bad_params",
            Self::DivisionByZero(_) => "division_by_zero",
            Self::Storage(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::NotFound { kind, id } => Some(json!({ "kind": kind, "id": id })),
            Self::DuplicateKey { kind, key } => Some(json!({ "kind": kind, "key": key })),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for RecordError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.into())
    }
}

pub type RecordResult<T> = Result<T, RecordError>;
