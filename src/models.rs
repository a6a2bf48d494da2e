use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::alerts::{self, SubjectAlert};
use crate::error::ParseScopeError;
use crate::gpa::{self, Grade};

/// Marks (percentage) below which a subject counts as failing.
pub const FAILING_MARKS: f64 = 40.0;

/// Credits assumed for a subject when the upload does not carry them.
pub const DEFAULT_CREDITS: f64 = 4.0;

/// Ingestion mode: only the latest semester participates (`current`) or the
/// full history does (`multi`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Current,
    Multi,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Current => "current",
            Scope::Multi => "multi",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = ParseScopeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "current" => Ok(Scope::Current),
            "multi" => Ok(Scope::Multi),
            other => Err(ParseScopeError(other.to_string())),
        }
    }
}

/// One CSV line exactly as uploaded. Every cell is optional so that a bad
/// cell rejects the row, not the batch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRow {
    pub roll_number: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub course: Option<String>,
    pub semester: Option<String>,
    pub subject_name: Option<String>,
    pub marks_obtained: Option<String>,
    pub total_marks: Option<String>,
    pub attendance_percentage: Option<String>,
    pub subject_credits: Option<String>,
    pub cgpa: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentIdentity {
    pub roll_number: String,
    pub name: String,
    pub email: String,
    pub course: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectRecord {
    pub roll_number: String,
    pub semester: u32,
    pub subject: String,
    pub marks_obtained: f64,
    pub total_marks: f64,
    /// `marks_obtained` as a percentage of `total_marks`.
    pub marks: f64,
    pub credits: f64,
    pub attendance: f64,
    pub reported_cgpa: Option<f64>,
}

impl SubjectRecord {
    /// Builds a record from raw marks; `marks` becomes the percentage.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        roll_number: String,
        semester: u32,
        subject: String,
        marks_obtained: f64,
        total_marks: f64,
        credits: f64,
        attendance: f64,
        reported_cgpa: Option<f64>,
    ) -> Self {
        Self {
            roll_number,
            semester,
            subject,
            marks_obtained,
            total_marks,
            marks: marks_obtained * 100.0 / total_marks,
            credits,
            attendance,
            reported_cgpa,
        }
    }

    pub fn grade(&self) -> Grade {
        gpa::grade_for(self.marks)
    }

    pub fn alert(&self) -> SubjectAlert {
        alerts::classify(self.marks, self.attendance)
    }

    pub fn is_failing(&self) -> bool {
        self.marks < FAILING_MARKS
    }
}

/// A validated row: who it belongs to and the subject result it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub student: StudentIdentity,
    pub record: SubjectRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentProfile {
    pub roll_number: String,
    pub name: String,
    pub email: String,
    pub course: String,
    records: Vec<SubjectRecord>,
}

impl StudentProfile {
    pub fn new(identity: StudentIdentity) -> Self {
        Self {
            roll_number: identity.roll_number,
            name: identity.name,
            email: identity.email,
            course: identity.course,
            records: Vec::new(),
        }
    }

    /// Records ordered by semester, then subject name.
    pub fn records(&self) -> &[SubjectRecord] {
        &self.records
    }

    /// Adds a record, replacing any earlier record for the same semester and
    /// subject. Returns `true` when a record was replaced.
    pub fn absorb(&mut self, identity: &StudentIdentity, record: SubjectRecord) -> bool {
        if !identity.name.is_empty() && identity.name != self.name {
            self.name = identity.name.clone();
        }
        self.insert_record(record)
    }

    fn insert_record(&mut self, record: SubjectRecord) -> bool {
        let key = (record.semester, record.subject.as_str());
        match self
            .records
            .binary_search_by(|existing| (existing.semester, existing.subject.as_str()).cmp(&key))
        {
            Ok(index) => {
                self.records[index] = record;
                true
            }
            Err(index) => {
                self.records.insert(index, record);
                false
            }
        }
    }

    pub fn latest_semester(&self) -> Option<u32> {
        self.records.iter().map(|record| record.semester).max()
    }

    pub fn semester_numbers(&self) -> Vec<u32> {
        let mut semesters: Vec<u32> = self.records.iter().map(|record| record.semester).collect();
        semesters.dedup();
        semesters
    }

    /// Records that feed aggregates under `scope`: every semester for
    /// `multi`, only the highest-numbered semester for `current`.
    pub fn participating(&self, scope: Scope) -> Vec<&SubjectRecord> {
        match scope {
            Scope::Multi => self.records.iter().collect(),
            Scope::Current => match self.latest_semester() {
                Some(latest) => self
                    .records
                    .iter()
                    .filter(|record| record.semester == latest)
                    .collect(),
                None => Vec::new(),
            },
        }
    }

    pub fn snapshots(&self, scope: Scope) -> Vec<SemesterSnapshot<'_>> {
        let mut snapshots: Vec<SemesterSnapshot<'_>> = Vec::new();
        for record in self.participating(scope) {
            let same_semester = snapshots
                .last()
                .is_some_and(|snapshot| snapshot.semester == record.semester);
            if same_semester {
                if let Some(snapshot) = snapshots.last_mut() {
                    snapshot.records.push(record);
                }
            } else {
                snapshots.push(SemesterSnapshot {
                    semester: record.semester,
                    records: vec![record],
                });
            }
        }
        snapshots
    }

    /// Replaces every semester `incoming` carries and keeps the rest.
    pub fn merge_semesters(&mut self, incoming: StudentProfile) -> usize {
        let replaced = incoming.semester_numbers();
        let before = self.records.len();
        self.records.retain(|record| !replaced.contains(&record.semester));
        let removed = before - self.records.len();

        if !incoming.name.is_empty() {
            self.name = incoming.name.clone();
        }
        for record in incoming.records {
            self.insert_record(record);
        }
        removed
    }
}

/// One semester's worth of a student's records.
#[derive(Debug, Clone)]
pub struct SemesterSnapshot<'a> {
    pub semester: u32,
    pub records: Vec<&'a SubjectRecord>,
}

impl SemesterSnapshot<'_> {
    pub fn sgpa(&self) -> f64 {
        gpa::sgpa(self.records.iter().copied())
    }

    pub fn average_attendance(&self) -> f64 {
        mean(self.records.iter().map(|record| record.attendance))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemesterGpa {
    pub semester: u32,
    pub sgpa: f64,
    pub attendance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GpaRecord {
    pub semesters: Vec<SemesterGpa>,
    /// Only present for `multi` datasets.
    pub cgpa: Option<f64>,
}

impl GpaRecord {
    pub fn sgpa_sequence(&self) -> Vec<f64> {
        self.semesters.iter().map(|semester| semester.sgpa).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub label: String,
    pub semester: u32,
    pub value: f64,
}

pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> StudentIdentity {
        StudentIdentity {
            roll_number: "CS001".to_string(),
            name: name.to_string(),
            email: "avery@example.edu".to_string(),
            course: "B.Tech CSE".to_string(),
        }
    }

    fn record(semester: u32, subject: &str, marks: f64) -> SubjectRecord {
        SubjectRecord {
            roll_number: "CS001".to_string(),
            semester,
            subject: subject.to_string(),
            marks_obtained: marks,
            total_marks: 100.0,
            marks,
            credits: DEFAULT_CREDITS,
            attendance: 80.0,
            reported_cgpa: None,
        }
    }

    #[test]
    fn scope_parses_case_insensitively() {
        assert_eq!("Multi".parse::<Scope>().unwrap(), Scope::Multi);
        assert_eq!(" current ".parse::<Scope>().unwrap(), Scope::Current);
        assert!("weekly".parse::<Scope>().is_err());
    }

    #[test]
    fn absorb_replaces_same_semester_subject() {
        let mut profile = StudentProfile::new(identity("Avery Lee"));
        assert!(!profile.absorb(&identity("Avery Lee"), record(1, "Maths", 50.0)));
        assert!(profile.absorb(&identity("Avery Lee"), record(1, "Maths", 70.0)));
        assert_eq!(profile.records().len(), 1);
        assert_eq!(profile.records()[0].marks, 70.0);
    }

    #[test]
    fn absorb_updates_display_name_only_when_present() {
        let mut profile = StudentProfile::new(identity("Avery Lee"));
        profile.absorb(&identity(""), record(1, "Maths", 50.0));
        assert_eq!(profile.name, "Avery Lee");
        profile.absorb(&identity("Avery J. Lee"), record(1, "Physics", 50.0));
        assert_eq!(profile.name, "Avery J. Lee");
        assert_eq!(profile.email, "avery@example.edu");
    }

    #[test]
    fn current_scope_uses_highest_semester() {
        let mut profile = StudentProfile::new(identity("Avery Lee"));
        profile.absorb(&identity("Avery Lee"), record(3, "Maths", 50.0));
        profile.absorb(&identity("Avery Lee"), record(1, "Maths", 90.0));
        profile.absorb(&identity("Avery Lee"), record(3, "Physics", 60.0));

        let current = profile.participating(Scope::Current);
        assert_eq!(current.len(), 2);
        assert!(current.iter().all(|record| record.semester == 3));
        assert_eq!(profile.participating(Scope::Multi).len(), 3);
        assert_eq!(profile.snapshots(Scope::Multi).len(), 2);
    }

    #[test]
    fn merge_replaces_only_incoming_semesters() {
        let mut stored = StudentProfile::new(identity("Avery Lee"));
        stored.absorb(&identity("Avery Lee"), record(1, "Maths", 50.0));
        stored.absorb(&identity("Avery Lee"), record(2, "Maths", 55.0));
        stored.absorb(&identity("Avery Lee"), record(2, "Physics", 65.0));

        let mut incoming = StudentProfile::new(identity("Avery Lee"));
        incoming.absorb(&identity("Avery Lee"), record(2, "Chemistry", 75.0));

        let removed = stored.merge_semesters(incoming);
        assert_eq!(removed, 2);
        let subjects: Vec<(u32, &str)> = stored
            .records()
            .iter()
            .map(|record| (record.semester, record.subject.as_str()))
            .collect();
        assert_eq!(subjects, vec![(1, "Maths"), (2, "Chemistry")]);
    }

    #[test]
    fn mean_of_nothing_is_zero() {
        assert_eq!(mean(Vec::new()), 0.0);
        assert_eq!(mean(vec![30.0, 90.0]), 60.0);
    }
}
