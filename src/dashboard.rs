//! Cohort roll-ups over a consolidated [`Dataset`].
//!
//! Nothing here is cached: every read re-evaluates each profile from its
//! records.

use std::cmp::Ordering;

use serde::Serialize;

use crate::alerts::SubjectAlert;
use crate::consolidate::Dataset;
use crate::gpa::{self, Grade};
use crate::models::{mean, round_to, GpaRecord, Scope, StudentProfile};
use crate::risk::{RiskAssessment, RiskScorer, RiskSignals, RiskStatus};
use crate::trend;

pub const DEFAULT_MIN_RISK: f64 = 0.4;
pub const TOP_PERFORMERS: usize = 5;

/// Everything derived for one student on this read.
#[derive(Debug, Clone)]
pub struct StudentSummary<'a> {
    pub profile: &'a StudentProfile,
    pub signals: RiskSignals,
    pub gpa: GpaRecord,
    pub has_alert: bool,
    pub risk: RiskAssessment,
}

impl StudentSummary<'_> {
    pub fn declining(&self) -> bool {
        self.signals.declining
    }
}

pub fn summarize<'a>(
    profile: &'a StudentProfile,
    scope: Scope,
    scorer: &dyn RiskScorer,
) -> StudentSummary<'a> {
    let records = profile.participating(scope);
    let gpa = gpa::gpa_record(profile, scope);
    let declining = scope == Scope::Multi && trend::is_declining(&gpa.sgpa_sequence());

    let signals = RiskSignals {
        average_attendance: mean(records.iter().map(|record| record.attendance)),
        average_marks: mean(records.iter().map(|record| record.marks)),
        failing_subjects: records.iter().filter(|record| record.is_failing()).count(),
        declining,
    };
    let has_alert = records
        .iter()
        .any(|record| record.alert() != SubjectAlert::Normal);
    let risk = scorer.score(&signals);

    StudentSummary {
        profile,
        signals,
        gpa,
        has_alert,
        risk,
    }
}

pub fn evaluate<'a>(dataset: &'a Dataset, scorer: &dyn RiskScorer) -> Vec<StudentSummary<'a>> {
    dataset
        .students()
        .map(|profile| summarize(profile, dataset.scope(), scorer))
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GradeCount {
    pub grade: Grade,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RiskDistribution {
    pub critical: usize,
    pub monitor: usize,
    pub safe: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CohortStats {
    pub scope: Scope,
    pub total_records: usize,
    pub total_students: usize,
    pub average_marks: f64,
    pub average_attendance: f64,
    pub grade_distribution: Vec<GradeCount>,
    pub students_with_alerts: usize,
    pub declining_students: usize,
    pub risk_distribution: RiskDistribution,
}

pub fn cohort_stats(dataset: &Dataset, summaries: &[StudentSummary<'_>]) -> CohortStats {
    let participating: Vec<_> = dataset
        .students()
        .flat_map(|profile| profile.participating(dataset.scope()))
        .collect();

    let grade_distribution = Grade::all()
        .map(|grade| GradeCount {
            grade,
            count: participating
                .iter()
                .filter(|record| record.grade() == grade)
                .count(),
        })
        .collect();

    let mut risk_distribution = RiskDistribution::default();
    for summary in summaries {
        match summary.risk.status {
            RiskStatus::Critical => risk_distribution.critical += 1,
            RiskStatus::Monitor => risk_distribution.monitor += 1,
            RiskStatus::Safe => risk_distribution.safe += 1,
        }
    }

    CohortStats {
        scope: dataset.scope(),
        total_records: dataset.total_records(),
        total_students: dataset.total_students(),
        average_marks: round_to(mean(participating.iter().map(|record| record.marks)), 1),
        average_attendance: round_to(
            mean(participating.iter().map(|record| record.attendance)),
            1,
        ),
        grade_distribution,
        students_with_alerts: summaries.iter().filter(|summary| summary.has_alert).count(),
        declining_students: summaries.iter().filter(|summary| summary.declining()).count(),
        risk_distribution,
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AlertEntry {
    pub roll_number: String,
    pub name: String,
    pub risk_score: f64,
    pub attendance: f64,
    pub marks: f64,
    pub status: RiskStatus,
    pub main_cause: String,
    pub actions: Vec<String>,
    pub message: String,
}

const GENERAL_CAUSE: &str = "General Academic Risk";

/// Students whose risk is strictly above `min_risk`, highest first.
pub fn ranked_alerts(summaries: &[StudentSummary<'_>], min_risk: f64) -> Vec<AlertEntry> {
    let mut flagged: Vec<&StudentSummary<'_>> = summaries
        .iter()
        .filter(|summary| summary.risk.risk_score > min_risk)
        .collect();
    flagged.sort_by(|a, b| {
        b.risk
            .risk_score
            .partial_cmp(&a.risk.risk_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.profile.roll_number.cmp(&b.profile.roll_number))
    });

    flagged
        .into_iter()
        .map(|summary| {
            let main_cause = summary
                .risk
                .main_cause
                .clone()
                .unwrap_or_else(|| GENERAL_CAUSE.to_string());
            AlertEntry {
                roll_number: summary.profile.roll_number.clone(),
                name: summary.profile.name.clone(),
                risk_score: summary.risk.risk_score,
                attendance: round_to(summary.signals.average_attendance, 1),
                marks: round_to(summary.signals.average_marks, 1),
                status: summary.risk.status,
                message: format!("{}: {}", summary.risk.status, main_cause),
                main_cause,
                actions: summary.risk.actions.clone(),
            }
        })
        .collect()
}

/// Ranked alerts, optionally cut to a display limit. `total` always counts
/// every flagged student.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AlertList {
    pub total: usize,
    pub alerts: Vec<AlertEntry>,
}

impl AlertList {
    pub fn new(mut alerts: Vec<AlertEntry>, limit: Option<usize>) -> Self {
        let total = alerts.len();
        if let Some(limit) = limit {
            alerts.truncate(limit);
        }
        Self { total, alerts }
    }

    pub fn is_truncated(&self) -> bool {
        self.alerts.len() < self.total
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecordRow {
    pub roll_number: String,
    pub name: String,
    pub semester: u32,
    pub subject: String,
    pub credits: f64,
    pub marks_obtained: f64,
    pub total_marks: f64,
    pub percentage: f64,
    pub grade: Grade,
    pub attendance: f64,
    pub risk_score: f64,
    pub subject_alert: SubjectAlert,
}

/// One row per stored subject result, carrying the student's overall risk.
pub fn record_table(summaries: &[StudentSummary<'_>]) -> Vec<RecordRow> {
    summaries
        .iter()
        .flat_map(|summary| {
            summary.profile.records().iter().map(move |record| RecordRow {
                roll_number: summary.profile.roll_number.clone(),
                name: summary.profile.name.clone(),
                semester: record.semester,
                subject: record.subject.clone(),
                credits: record.credits,
                marks_obtained: record.marks_obtained,
                total_marks: record.total_marks,
                percentage: round_to(record.marks, 2),
                grade: record.grade(),
                attendance: record.attendance,
                risk_score: summary.risk.risk_score,
                subject_alert: record.alert(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BandCount {
    pub band: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Correlation {
    pub attendance: Vec<f64>,
    pub sgpa: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopPerformer {
    pub roll_number: String,
    pub name: String,
    pub cgpa: f64,
    pub reported_cgpa: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GpaAnalytics {
    pub distribution: Vec<BandCount>,
    pub correlation: Correlation,
    pub top_performers: Vec<TopPerformer>,
}

impl GpaAnalytics {
    /// The "insufficient data" shape: every band zero, every list empty.
    pub fn empty() -> Self {
        Self {
            distribution: gpa::SGPA_BANDS
                .iter()
                .map(|(band, _)| BandCount { band: *band, count: 0 })
                .collect(),
            correlation: Correlation::default(),
            top_performers: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.correlation.sgpa.is_empty()
    }
}

/// SGPA histogram, attendance/SGPA pairs and the best CGPAs. Only `multi`
/// datasets carry semester history; anything else gets the empty shape.
pub fn gpa_analytics(scope: Scope, summaries: &[StudentSummary<'_>]) -> GpaAnalytics {
    let mut analytics = GpaAnalytics::empty();
    if scope != Scope::Multi {
        return analytics;
    }

    for semester in summaries.iter().flat_map(|summary| summary.gpa.semesters.iter()) {
        let band = gpa::sgpa_band(semester.sgpa);
        if let Some(slot) = analytics.distribution.iter_mut().find(|slot| slot.band == band) {
            slot.count += 1;
        }
        analytics.correlation.attendance.push(round_to(semester.attendance, 1));
        analytics.correlation.sgpa.push(semester.sgpa);
    }

    let mut ranked: Vec<TopPerformer> = summaries
        .iter()
        .filter_map(|summary| {
            summary.gpa.cgpa.map(|cgpa| TopPerformer {
                roll_number: summary.profile.roll_number.clone(),
                name: summary.profile.name.clone(),
                cgpa,
                reported_cgpa: summary
                    .profile
                    .records()
                    .iter()
                    .rev()
                    .find_map(|record| record.reported_cgpa),
            })
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.cgpa
            .partial_cmp(&a.cgpa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.roll_number.cmp(&b.roll_number))
    });
    ranked.truncate(TOP_PERFORMERS);
    analytics.top_performers = ranked;

    analytics
}

/// A single student's evaluation, laid out for explanation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StudentInsight {
    pub roll_number: String,
    pub name: String,
    pub email: String,
    pub course: String,
    pub signals: RiskSignals,
    pub gpa: GpaRecord,
    pub assessment: RiskAssessment,
}

impl From<&StudentSummary<'_>> for StudentInsight {
    fn from(summary: &StudentSummary<'_>) -> Self {
        Self {
            roll_number: summary.profile.roll_number.clone(),
            name: summary.profile.name.clone(),
            email: summary.profile.email.clone(),
            course: summary.profile.course.clone(),
            signals: summary.signals,
            gpa: summary.gpa.clone(),
            assessment: summary.risk.clone(),
        }
    }
}
