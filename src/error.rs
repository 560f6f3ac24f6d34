use crate::value::ValueKind;
use std::fmt;

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, CepError>;

/// Broad classification of a [`CepError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Schema,
    InvalidValue,
    Query,
    InternalConsistency,
    Dispatch,
}

/// One offending field reported by schema validation
#[derive(Debug, Clone, PartialEq)]
pub enum FieldMismatch {
    Missing(String),
    Unexpected(String),
    WrongKind {
        field: String,
        expected: ValueKind,
        actual: ValueKind,
    },
}

impl FieldMismatch {
    pub fn field(&self) -> &str {
        match self {
            FieldMismatch::Missing(field) | FieldMismatch::Unexpected(field) => field,
            FieldMismatch::WrongKind { field, .. } => field,
        }
    }
}

impl fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldMismatch::Missing(field) => write!(f, "missing field '{}'", field),
            FieldMismatch::Unexpected(field) => write!(f, "unexpected field '{}'", field),
            FieldMismatch::WrongKind {
                field,
                expected,
                actual,
            } => write!(f, "field '{}' expects {}, got {}", field, expected, actual),
        }
    }
}

fn join_mismatches(mismatches: &[FieldMismatch]) -> String {
    mismatches
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by the CEP engine
#[derive(Debug, thiserror::Error)]
pub enum CepError {
    #[error("unknown event type '{0}'")]
    UnknownType(String),

    #[error("event type '{0}' is already registered with a different schema")]
    DuplicateType(String),

    #[error("invalid schema for event type '{name}': {reason}")]
    InvalidSchema { name: String, reason: String },

    /// The offered field values do not conform to the registered schema.
    #[error("event does not match schema of '{type_name}': {}", join_mismatches(.mismatches))]
    SchemaMismatch {
        type_name: String,
        mismatches: Vec<FieldMismatch>,
    },

    #[error("invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("invalid statement: {0}")]
    InvalidStatement(String),

    #[error("failed to parse statement: {0}")]
    Parse(String),

    #[error("unknown statement {0}")]
    UnknownStatement(u64),

    /// Window and aggregate state disagree. Indicates a bug in the engine.
    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),

    #[error("events cannot be sent from a listener on the dispatching thread")]
    ReentrantSend,
}

impl CepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CepError::UnknownType(_)
            | CepError::DuplicateType(_)
            | CepError::InvalidSchema { .. }
            | CepError::SchemaMismatch { .. } => ErrorKind::Schema,
            CepError::InvalidValue { .. } => ErrorKind::InvalidValue,
            CepError::InvalidStatement(_)
            | CepError::Parse(_)
            | CepError::UnknownStatement(_) => ErrorKind::Query,
            CepError::InternalConsistency(_) => ErrorKind::InternalConsistency,
            CepError::ReentrantSend => ErrorKind::Dispatch,
        }
    }

    pub fn is_schema_error(&self) -> bool {
        self.kind() == ErrorKind::Schema
    }
}
