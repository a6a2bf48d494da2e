use std::collections::BTreeMap;

use crate::models::{NormalizedRow, Scope, StudentProfile, SubjectRecord};
use crate::normalize::normalize_roll;

/// The consolidated student set for one scope. Profiles are keyed by
/// normalized roll number, so iteration order is stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    scope: Scope,
    students: BTreeMap<String, StudentProfile>,
}

impl Dataset {
    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn students(&self) -> impl Iterator<Item = &StudentProfile> {
        self.students.values()
    }

    pub fn student(&self, roll_number: &str) -> Option<&StudentProfile> {
        self.students.get(&normalize_roll(roll_number))
    }

    pub fn records(&self) -> impl Iterator<Item = &SubjectRecord> {
        self.students.values().flat_map(|profile| profile.records())
    }

    pub fn total_records(&self) -> usize {
        self.students
            .values()
            .map(|profile| profile.records().len())
            .sum()
    }

    pub fn total_students(&self) -> usize {
        self.students.len()
    }

    /// Folds a later `multi` upload into this one. Every (student, semester)
    /// the upload carries replaces what was stored; everything else is kept.
    /// Any other combination of scopes replaces the dataset outright.
    pub fn merge(mut self, incoming: Dataset) -> Dataset {
        if self.scope != Scope::Multi || incoming.scope != Scope::Multi {
            return incoming;
        }

        for (roll_number, profile) in incoming.students {
            match self.students.get_mut(&roll_number) {
                Some(existing) => {
                    existing.merge_semesters(profile);
                }
                None => {
                    self.students.insert(roll_number, profile);
                }
            }
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Consolidation {
    pub dataset: Dataset,
    pub records_ingested: usize,
    pub duplicates_replaced: usize,
}

/// Groups validated rows into profiles. The first row for a roll number
/// fixes email and course; later non-empty names update the display name. A
/// repeated (semester, subject) replaces the earlier record.
pub fn consolidate(rows: Vec<NormalizedRow>, scope: Scope) -> Consolidation {
    let mut students: BTreeMap<String, StudentProfile> = BTreeMap::new();
    let mut records_ingested = 0usize;
    let mut duplicates_replaced = 0usize;

    for NormalizedRow { student, record } in rows {
        records_ingested += 1;
        let profile = students
            .entry(student.roll_number.clone())
            .or_insert_with(|| StudentProfile::new(student.clone()));
        if profile.absorb(&student, record) {
            duplicates_replaced += 1;
        }
    }

    Consolidation {
        dataset: Dataset { scope, students },
        records_ingested,
        duplicates_replaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudentIdentity;

    fn row(roll: &str, name: &str, semester: u32, subject: &str, marks: f64) -> NormalizedRow {
        let roll_number = normalize_roll(roll);
        NormalizedRow {
            student: StudentIdentity {
                roll_number: roll_number.clone(),
                name: name.to_string(),
                email: format!("{}@example.edu", roll_number.to_lowercase()),
                course: "B.Sc Physics".to_string(),
            },
            record: SubjectRecord {
                roll_number,
                semester,
                subject: subject.to_string(),
                marks_obtained: marks,
                total_marks: 100.0,
                marks,
                credits: 4.0,
                attendance: 80.0,
                reported_cgpa: None,
            },
        }
    }

    #[test]
    fn groups_by_normalized_roll_number() {
        let rows = vec![
            row("ph7", "Kiara Patel", 1, "Optics", 70.0),
            row(" PH7 ", "Kiara Patel", 1, "Mechanics", 60.0),
            row("ph8", "Sam Ortiz", 1, "Optics", 50.0),
        ];
        let consolidation = consolidate(rows, Scope::Current);
        let dataset = &consolidation.dataset;
        assert_eq!(dataset.total_students(), 2);
        assert_eq!(dataset.total_records(), 3);
        assert!(dataset.total_records() >= dataset.total_students());
        assert_eq!(dataset.student("Ph7").unwrap().records().len(), 2);
    }

    #[test]
    fn first_row_fixes_identity() {
        let mut later = row("ph7", "Kiara R. Patel", 2, "Optics", 70.0);
        later.student.email = "kiara.other@example.edu".to_string();
        let rows = vec![row("ph7", "Kiara Patel", 1, "Optics", 70.0), later];

        let consolidation = consolidate(rows, Scope::Multi);
        let profile = consolidation.dataset.student("PH7").unwrap();
        assert_eq!(profile.email, "ph7@example.edu");
        assert_eq!(profile.name, "Kiara R. Patel");
    }

    #[test]
    fn repeated_subject_replaces_earlier_row() {
        let rows = vec![
            row("ph7", "Kiara Patel", 1, "Optics", 40.0),
            row("ph7", "Kiara Patel", 1, "Optics", 75.0),
        ];
        let consolidation = consolidate(rows, Scope::Current);
        assert_eq!(consolidation.records_ingested, 2);
        assert_eq!(consolidation.duplicates_replaced, 1);
        assert_eq!(consolidation.dataset.total_records(), 1);
        assert_eq!(consolidation.dataset.records().next().unwrap().marks, 75.0);
    }

    #[test]
    fn multi_merge_is_additive_by_semester() {
        let first = consolidate(
            vec![
                row("ph7", "Kiara Patel", 1, "Optics", 70.0),
                row("ph7", "Kiara Patel", 2, "Optics", 65.0),
            ],
            Scope::Multi,
        )
        .dataset;
        let second = consolidate(
            vec![
                row("ph7", "Kiara Patel", 2, "Quantum", 55.0),
                row("ph8", "Sam Ortiz", 3, "Optics", 80.0),
            ],
            Scope::Multi,
        )
        .dataset;

        let merged = first.merge(second);
        assert_eq!(merged.total_students(), 2);
        let subjects: Vec<(u32, String)> = merged
            .student("PH7")
            .unwrap()
            .records()
            .iter()
            .map(|record| (record.semester, record.subject.clone()))
            .collect();
        assert_eq!(
            subjects,
            vec![(1, "Optics".to_string()), (2, "Quantum".to_string())]
        );
        let semesters: Vec<u32> = merged.records().map(|record| record.semester).collect();
        assert_eq!(semesters, vec![1, 2, 3]);
    }

    #[test]
    fn current_upload_replaces_everything() {
        let first = consolidate(
            vec![row("ph7", "Kiara Patel", 1, "Optics", 70.0)],
            Scope::Multi,
        )
        .dataset;
        let second = consolidate(
            vec![row("ph9", "Lee Wong", 4, "Optics", 70.0)],
            Scope::Current,
        )
        .dataset;
        let merged = first.merge(second.clone());
        assert_eq!(merged, second);
    }
}
