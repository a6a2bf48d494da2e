//! Marks to letter grade to grade point, and the SGPA/CGPA built on top.
//!
//! | Marks (%) | Grade | Point |
//! |-----------|-------|-------|
//! | >= 90     | O     | 10    |
//! | >= 80     | A+    | 9     |
//! | >= 70     | A     | 8     |
//! | >= 60     | B     | 7     |
//! | >= 50     | C     | 6     |
//! | >= 40     | D     | 5     |
//! | < 40      | F     | 0     |

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::models::{mean, round_to, GpaRecord, Scope, SemesterGpa, StudentProfile, SubjectRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Grade {
    O,
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn label(self) -> &'static str {
        match self {
            Grade::O => "O",
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }

    pub fn point(self) -> f64 {
        GRADE_TABLE
            .iter()
            .find(|band| band.grade == self)
            .map(|band| band.point)
            .unwrap_or(0.0)
    }

    /// Every grade, best first.
    pub fn all() -> impl Iterator<Item = Grade> {
        GRADE_TABLE.iter().map(|band| band.grade)
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GradeBand {
    pub min_marks: f64,
    pub grade: Grade,
    pub point: f64,
}

pub const GRADE_TABLE: &[GradeBand] = &[
    GradeBand {
        min_marks: 90.0,
        grade: Grade::O,
        point: 10.0,
    },
    GradeBand {
        min_marks: 80.0,
        grade: Grade::APlus,
        point: 9.0,
    },
    GradeBand {
        min_marks: 70.0,
        grade: Grade::A,
        point: 8.0,
    },
    GradeBand {
        min_marks: 60.0,
        grade: Grade::B,
        point: 7.0,
    },
    GradeBand {
        min_marks: 50.0,
        grade: Grade::C,
        point: 6.0,
    },
    GradeBand {
        min_marks: 40.0,
        grade: Grade::D,
        point: 5.0,
    },
    GradeBand {
        min_marks: f64::NEG_INFINITY,
        grade: Grade::F,
        point: 0.0,
    },
];

pub fn grade_for(marks: f64) -> Grade {
    GRADE_TABLE
        .iter()
        .find(|band| marks >= band.min_marks)
        .map(|band| band.grade)
        .unwrap_or(Grade::F)
}

pub fn grade_point(marks: f64) -> f64 {
    grade_for(marks).point()
}

/// Credit-weighted mean grade point, rounded to two places. No credits
/// means `0.00`.
pub fn sgpa<'a>(records: impl IntoIterator<Item = &'a SubjectRecord>) -> f64 {
    weighted_points(records.into_iter().map(|record| (record.marks, record.credits)))
}

/// Mean of the given SGPAs, `None` when there are none.
pub fn cgpa(sgpas: &[f64]) -> Option<f64> {
    if sgpas.is_empty() {
        None
    } else {
        Some(round_to(mean(sgpas.iter().copied()), 2))
    }
}

fn weighted_points(rows: impl IntoIterator<Item = (f64, f64)>) -> f64 {
    let (points, credits) = rows
        .into_iter()
        .fold((0.0, 0.0), |(points, credits), (marks, credit)| {
            (points + grade_point(marks) * credit, credits + credit)
        });
    if credits > 0.0 {
        round_to(points / credits, 2)
    } else {
        0.0
    }
}

/// Per-semester SGPAs for a student, plus the CGPA when the dataset holds
/// full history.
pub fn gpa_record(profile: &StudentProfile, scope: Scope) -> GpaRecord {
    let semesters: Vec<SemesterGpa> = profile
        .snapshots(scope)
        .iter()
        .map(|snapshot| SemesterGpa {
            semester: snapshot.semester,
            sgpa: snapshot.sgpa(),
            attendance: snapshot.average_attendance(),
        })
        .collect();

    let cgpa = match scope {
        Scope::Multi => cgpa(&semesters.iter().map(|s| s.sgpa).collect::<Vec<_>>()),
        Scope::Current => None,
    };

    GpaRecord { semesters, cgpa }
}

/// A hypothetical subject for the what-if calculator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WhatIfSubject {
    pub marks: f64,
    pub credits: f64,
}

impl FromStr for WhatIfSubject {
    type Err = String;

    /// Parses `marks:credits`, e.g. `85:4`. Credits default to 4.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (marks, credits) = match value.split_once(':') {
            Some((marks, credits)) => (marks, Some(credits)),
            None => (value, None),
        };
        let marks: f64 = marks
            .trim()
            .parse()
            .map_err(|_| format!("invalid marks in `{value}`"))?;
        let credits: f64 = match credits {
            Some(credits) => credits
                .trim()
                .parse()
                .map_err(|_| format!("invalid credits in `{value}`"))?,
            None => crate::models::DEFAULT_CREDITS,
        };
        if !(0.0..=100.0).contains(&marks) || !credits.is_finite() || credits < 0.0 {
            return Err(format!("`{value}` must be marks in 0-100 and non-negative credits"));
        }
        Ok(WhatIfSubject { marks, credits })
    }
}

pub fn what_if(subjects: &[WhatIfSubject]) -> f64 {
    weighted_points(subjects.iter().map(|subject| (subject.marks, subject.credits)))
}

pub const SGPA_BANDS: &[(&str, f64)] = &[
    ("9-10", 9.0),
    ("8-9", 8.0),
    ("7-8", 7.0),
    ("6-7", 6.0),
    ("5-6", 5.0),
    ("4-5", 4.0),
    ("<4", f64::NEG_INFINITY),
];

pub fn sgpa_band(sgpa: f64) -> &'static str {
    SGPA_BANDS
        .iter()
        .find(|(_, floor)| sgpa >= *floor)
        .map(|(label, _)| *label)
        .unwrap_or("<4")
}
