//! Turns uploaded CSV rows into validated [`NormalizedRow`]s.

use std::io::Read;

use tracing::debug;

use crate::error::{EngineError, RowError};
use crate::models::{
    NormalizedRow, RawRow, Scope, StudentIdentity, SubjectRecord, DEFAULT_CREDITS,
};

pub const REQUIRED_COLUMNS: [&str; 9] = [
    "roll_number",
    "name",
    "email",
    "course",
    "semester",
    "subject_name",
    "marks_obtained",
    "total_marks",
    "attendance_percentage",
];

pub fn required_columns(scope: Scope) -> Vec<&'static str> {
    let mut columns = REQUIRED_COLUMNS.to_vec();
    columns.push(match scope {
        Scope::Current => "subject_credits",
        Scope::Multi => "cgpa",
    });
    columns
}

pub fn check_headers<'a>(
    headers: impl IntoIterator<Item = &'a str>,
    scope: Scope,
) -> Result<(), EngineError> {
    let present: Vec<&str> = headers.into_iter().map(str::trim).collect();
    let missing: Vec<String> = required_columns(scope)
        .into_iter()
        .filter(|column| !present.contains(column))
        .map(str::to_string)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Schema { scope, missing })
    }
}

/// Canonical form of a roll number: trimmed and upper-cased.
pub fn normalize_roll(roll: &str) -> String {
    roll.trim().to_uppercase()
}

fn text(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, RowError> {
    text(value).ok_or(RowError::Missing(field))
}

fn number(value: &str, field: &'static str) -> Result<f64, RowError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
        .ok_or_else(|| RowError::Malformed {
            field,
            value: value.to_string(),
        })
}

fn required_number(value: &Option<String>, field: &'static str) -> Result<f64, RowError> {
    number(required(value, field)?, field)
}

fn optional_number(value: &Option<String>, field: &'static str) -> Result<Option<f64>, RowError> {
    text(value).map(|raw| number(raw, field)).transpose()
}

fn in_range(value: f64, min: f64, max: f64, field: &'static str) -> Result<f64, RowError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(RowError::OutOfRange { field, value })
    }
}

fn semester(value: &Option<String>) -> Result<u32, RowError> {
    let parsed = required_number(value, "semester")?;
    if parsed < 1.0 || parsed.fract() != 0.0 || parsed > f64::from(u32::MAX) {
        return Err(RowError::OutOfRange {
            field: "semester",
            value: parsed,
        });
    }
    Ok(parsed as u32)
}

/// Validates one raw row for `scope`.
pub fn normalize_row(raw: &RawRow, scope: Scope) -> Result<NormalizedRow, RowError> {
    let roll_number = normalize_roll(required(&raw.roll_number, "roll_number")?);
    let name = required(&raw.name, "name")?.to_string();
    let email = required(&raw.email, "email")?.to_string();
    let course = required(&raw.course, "course")?.to_string();
    let semester = semester(&raw.semester)?;
    let subject = required(&raw.subject_name, "subject_name")?.to_string();

    let marks_obtained = required_number(&raw.marks_obtained, "marks_obtained")?;
    let total_marks = required_number(&raw.total_marks, "total_marks")?;
    let attendance = required_number(&raw.attendance_percentage, "attendance_percentage")?;

    if marks_obtained < 0.0 {
        return Err(RowError::OutOfRange {
            field: "marks_obtained",
            value: marks_obtained,
        });
    }
    if total_marks <= 0.0 {
        return Err(RowError::OutOfRange {
            field: "total_marks",
            value: total_marks,
        });
    }
    if marks_obtained > total_marks {
        return Err(RowError::MarksExceedTotal {
            obtained: marks_obtained,
            total: total_marks,
        });
    }
    let attendance = in_range(attendance, 0.0, 100.0, "attendance_percentage")?;

    let credits = match scope {
        Scope::Current => Some(required_number(&raw.subject_credits, "subject_credits")?),
        Scope::Multi => optional_number(&raw.subject_credits, "subject_credits")?,
    }
    .unwrap_or(DEFAULT_CREDITS);
    let credits = in_range(credits, 0.0, f64::MAX, "subject_credits")?;

    let reported_cgpa = match scope {
        Scope::Multi => Some(required_number(&raw.cgpa, "cgpa")?),
        Scope::Current => optional_number(&raw.cgpa, "cgpa")?,
    }
    .map(|cgpa| in_range(cgpa, 0.0, 10.0, "cgpa"))
    .transpose()?;

    Ok(NormalizedRow {
        student: StudentIdentity {
            roll_number: roll_number.clone(),
            name,
            email,
            course,
        },
        record: SubjectRecord::new(
            roll_number,
            semester,
            subject,
            marks_obtained,
            total_marks,
            credits,
            attendance,
            reported_cgpa,
        ),
    })
}

/// Everything that survived validation, plus the counts needed for the
/// ingest summary.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub rows: Vec<NormalizedRow>,
    pub rows_read: usize,
    pub skipped: usize,
}

/// Reads a whole CSV upload. Bad rows are skipped and counted; a bad header
/// or an upload with no usable rows fails the batch.
pub fn read_upload<R: Read>(reader: R, scope: Scope) -> Result<Upload, EngineError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    check_headers(headers.iter(), scope)?;

    let mut upload = Upload::default();
    for (index, result) in reader.deserialize::<RawRow>().enumerate() {
        upload.rows_read += 1;
        let normalized = result
            .map_err(|err| RowError::Unreadable(err.to_string()))
            .and_then(|raw| normalize_row(&raw, scope));

        match normalized {
            Ok(row) => upload.rows.push(row),
            Err(err) => {
                upload.skipped += 1;
                // +1 for the header, +1 for one-based line numbers.
                debug!(line = index + 2, error = %err, "skipping row");
            }
        }
    }

    if upload.rows.is_empty() {
        return Err(EngineError::NoValidRows {
            rows_read: upload.rows_read,
            skipped: upload.skipped,
        });
    }

    Ok(upload)
}
