//! Error types for the engine.
//!
//! Row-level problems are [`RowError`]s: the row is skipped and counted, the
//! batch carries on. File- and state-level problems are [`EngineError`]s and
//! reach the caller. A zero-credit SGPA is not an error at all; it resolves to
//! `0.00`.

use thiserror::Error;

use crate::models::Scope;

/// Why a single uploaded row was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("missing required field `{0}`")]
    Missing(&'static str),

    #[error("field `{field}` is not a number: {value:?}")]
    Malformed { field: &'static str, value: String },

    #[error("field `{field}` is out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("marks_obtained {obtained} exceeds total_marks {total}")]
    MarksExceedTotal { obtained: f64, total: f64 },

    #[error("row could not be decoded: {0}")]
    Unreadable(String),
}

/// Errors surfaced to the caller of an engine operation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The header lacks columns the chosen scope requires.
    #[error("upload is missing required columns for scope `{scope}`: {}", .missing.join(", "))]
    Schema { scope: Scope, missing: Vec<String> },

    /// The header was fine but not a single row survived validation.
    #[error("upload contained no valid rows ({skipped} of {rows_read} rows skipped)")]
    NoValidRows { rows_read: usize, skipped: usize },

    /// A write (ingest or reset) is already running. Safe to retry.
    #[error("another ingest or reset is in progress; retry once it completes")]
    WriteInProgress,

    #[error("failed to read upload: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown scope `{0}` (expected `current` or `multi`)")]
pub struct ParseScopeError(pub String);
