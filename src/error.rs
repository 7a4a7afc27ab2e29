//! Error and diagnostic types shared by the detection and statistics engines.
//!
//! Two families live here:
//!
//! - [`SurveyError`] is returned as `Err` and stops the current call. Only
//!   structurally invalid input (no columns, no rows, ragged rows) and
//!   misuse of the engines (aggregating a `skip` question, dangling column
//!   references) produce one.
//! - [`Diagnostic`] is never returned as `Err`. Detection and configuration
//!   collect diagnostics alongside their results so that one bad question
//!   never blocks the rest of the survey.

use thiserror::Error;

pub type Result<T, E = SurveyError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurveyError {
    #[error("Survey has no columns")]
    NoColumns,
    #[error("Survey has no data rows")]
    NoRows,
    #[error("Row {row} has {found} cell(s) but the header defines {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Question '{0}' is marked skip and cannot be aggregated")]
    SkippedQuestion(String),
    #[error(
        "Column {column} referenced by question '{question}' is outside the survey's {available} column(s)"
    )]
    ColumnOutOfRange {
        question: String,
        column: usize,
        available: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    #[error("Question '{question}' could not be classified: {reason}")]
    AmbiguousDetection { question: String, reason: String },
    #[error("Override for '{question}' ignored: {reason}")]
    MalformedOverride { question: String, reason: String },
    #[error("Header '{header}' at column {column} has no question identifier; started implicit group '{question}'")]
    UnlabeledLeadingColumns {
        question: String,
        column: usize,
        header: String,
    },
    #[error("Column {column} ('{header}') looks like respondent metadata and was excluded")]
    MetadataColumn { column: usize, header: String },
    #[error("Column {column} ('{header}') holds open 'other, specify' answers and was excluded")]
    OpenEndedColumn { column: usize, header: String },
    #[error("Column {column} repeats the header of column {first} ('{header}') and was excluded")]
    DuplicateHeader {
        column: usize,
        first: usize,
        header: String,
    },
    #[error("Question id '{original}' is used more than once; renamed to '{renamed}'")]
    DuplicateId { original: String, renamed: String },
    #[error("Demographic question '{0}' is not defined")]
    UnknownDemographic(String),
}

impl Diagnostic {
    /// Question id the diagnostic refers to, when it refers to one.
    pub fn question(&self) -> Option<&str> {
        match self {
            Diagnostic::AmbiguousDetection { question, .. }
            | Diagnostic::MalformedOverride { question, .. }
            | Diagnostic::UnlabeledLeadingColumns { question, .. } => Some(question),
            Diagnostic::DuplicateId { renamed, .. } => Some(renamed),
            Diagnostic::UnknownDemographic(id) => Some(id),
            Diagnostic::MetadataColumn { .. }
            | Diagnostic::OpenEndedColumn { .. }
            | Diagnostic::DuplicateHeader { .. } => None,
        }
    }
}
