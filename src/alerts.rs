use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SubjectAlert {
    Normal,
    Warning,
    Critical,
}

impl SubjectAlert {
    pub fn as_str(self) -> &'static str {
        match self {
            SubjectAlert::Normal => "Normal",
            SubjectAlert::Warning => "Warning",
            SubjectAlert::Critical => "Critical",
        }
    }
}

impl fmt::Display for SubjectAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
enum Combine {
    Both,
    Either,
}

#[derive(Debug, Clone, Copy)]
struct AlertRule {
    alert: SubjectAlert,
    marks_below: f64,
    attendance_below: f64,
    combine: Combine,
}

impl AlertRule {
    fn matches(&self, marks: f64, attendance: f64) -> bool {
        let low_marks = marks < self.marks_below;
        let low_attendance = attendance < self.attendance_below;
        match self.combine {
            Combine::Both => low_marks && low_attendance,
            Combine::Either => low_marks || low_attendance,
        }
    }
}

// Checked in order; the first match wins.
const ALERT_RULES: [AlertRule; 2] = [
    AlertRule {
        alert: SubjectAlert::Critical,
        marks_below: 40.0,
        attendance_below: 60.0,
        combine: Combine::Both,
    },
    AlertRule {
        alert: SubjectAlert::Warning,
        marks_below: 50.0,
        attendance_below: 65.0,
        combine: Combine::Either,
    },
];

/// Flags one subject result from its percentage marks and attendance.
pub fn classify(marks: f64, attendance: f64) -> SubjectAlert {
    ALERT_RULES
        .iter()
        .find(|rule| rule.matches(marks, attendance))
        .map(|rule| rule.alert)
        .unwrap_or(SubjectAlert::Normal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_needs_both_low_marks_and_low_attendance() {
        assert_eq!(classify(35.0, 55.0), SubjectAlert::Critical);
        assert_eq!(classify(35.0, 80.0), SubjectAlert::Warning);
        assert_eq!(classify(70.0, 55.0), SubjectAlert::Warning);
    }

    #[test]
    fn warning_bands_are_strict() {
        assert_eq!(classify(49.9, 90.0), SubjectAlert::Warning);
        assert_eq!(classify(50.0, 65.0), SubjectAlert::Normal);
        assert_eq!(classify(80.0, 64.9), SubjectAlert::Warning);
    }

    #[test]
    fn critical_boundaries_are_strict() {
        assert_eq!(classify(40.0, 59.0), SubjectAlert::Warning);
        assert_eq!(classify(39.0, 60.0), SubjectAlert::Warning);
        assert_eq!(classify(39.9, 59.9), SubjectAlert::Critical);
    }
}
