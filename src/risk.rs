use std::fmt;

use serde::Serialize;

/// What the scorer looks at for one student.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskSignals {
    pub average_attendance: f64,
    pub average_marks: f64,
    pub failing_subjects: usize,
    /// SGPA has been falling across the most recent semesters.
    pub declining: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RiskStatus {
    Safe,
    Monitor,
    Critical,
}

impl RiskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskStatus::Safe => "Safe",
            RiskStatus::Monitor => "Monitor",
            RiskStatus::Critical => "Critical",
        }
    }
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration order is tie-break precedence for the main cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RiskFactor {
    Attendance,
    Marks,
    FailingSubjects,
    Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskContribution {
    pub factor: RiskFactor,
    pub band: &'static str,
    pub points: u32,
    pub cause: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub risk_score: f64,
    pub status: RiskStatus,
    pub main_cause: Option<String>,
    pub actions: Vec<String>,
    pub contributions: Vec<RiskContribution>,
}

impl RiskAssessment {
    pub fn points(&self) -> u32 {
        self.contributions.iter().map(|c| c.points).sum()
    }
}

/// Anything that turns a student's signals into an assessment. The
/// heuristic below is the default; a different model can slot in behind the
/// same call.
pub trait RiskScorer: Send + Sync {
    fn score(&self, signals: &RiskSignals) -> RiskAssessment;
}

/// Fires when the measured value is strictly below `below`.
#[derive(Debug, Clone, Copy)]
pub struct PenaltyBand {
    pub below: f64,
    pub points: u32,
    pub band: &'static str,
    pub cause: &'static str,
    pub actions: &'static [&'static str],
}

/// Fires when at least `at_least` subjects are failing.
#[derive(Debug, Clone, Copy)]
pub struct CountPenalty {
    pub at_least: usize,
    pub points: u32,
    pub cause: &'static str,
    pub actions: &'static [&'static str],
}

/// Fires when the SGPA sequence is declining.
#[derive(Debug, Clone, Copy)]
pub struct TrendPenalty {
    pub points: u32,
    pub cause: &'static str,
    pub actions: &'static [&'static str],
}

pub const ATTENDANCE_BANDS: &[PenaltyBand] = &[
    PenaltyBand {
        below: 60.0,
        points: 40,
        band: "critical",
        cause: "Critical Attendance Failure",
        actions: &["Contact Parents", "Attendance Warning Letter"],
    },
    PenaltyBand {
        below: 75.0,
        points: 15,
        band: "low",
        cause: "Low Attendance",
        actions: &["Attendance Counseling"],
    },
];

pub const MARKS_BANDS: &[PenaltyBand] = &[
    PenaltyBand {
        below: 40.0,
        points: 30,
        band: "critical",
        cause: "Academic Failure",
        actions: &["Remedial Session", "Subject Retake Plan"],
    },
    PenaltyBand {
        below: 60.0,
        points: 15,
        band: "median",
        cause: "Low Academic Performance",
        actions: &["Peer Tutoring"],
    },
];

pub const FAILING_SUBJECTS_PENALTY: CountPenalty = CountPenalty {
    at_least: 3,
    points: 10,
    cause: "Multiple Failing Subjects",
    actions: &["Subject Retake Plan"],
};

pub const DECLINE_PENALTY: TrendPenalty = TrendPenalty {
    points: 15,
    cause: "Declining SGPA Trend",
    actions: &["Academic Advisor Review"],
};

/// Strict lower bounds, highest first.
pub const STATUS_THRESHOLDS: &[(f64, RiskStatus)] =
    &[(0.7, RiskStatus::Critical), (0.4, RiskStatus::Monitor)];

pub const MAX_POINTS: u32 = 100;

pub fn status_for(risk_score: f64) -> RiskStatus {
    STATUS_THRESHOLDS
        .iter()
        .find(|(floor, _)| risk_score > *floor)
        .map(|(_, status)| *status)
        .unwrap_or(RiskStatus::Safe)
}

pub fn normalize_points(points: u32) -> f64 {
    f64::from(points.min(MAX_POINTS)) / f64::from(MAX_POINTS)
}

fn first_band(bands: &'static [PenaltyBand], value: f64) -> Option<&'static PenaltyBand> {
    bands.iter().find(|band| value < band.below)
}

/// Points-based scorer driven entirely by its threshold tables.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicScorer {
    pub attendance: &'static [PenaltyBand],
    pub marks: &'static [PenaltyBand],
    pub failing_subjects: CountPenalty,
    pub decline: TrendPenalty,
}

impl Default for HeuristicScorer {
    fn default() -> Self {
        Self {
            attendance: ATTENDANCE_BANDS,
            marks: MARKS_BANDS,
            failing_subjects: FAILING_SUBJECTS_PENALTY,
            decline: DECLINE_PENALTY,
        }
    }
}

impl HeuristicScorer {
    fn fired(&self, signals: &RiskSignals) -> Vec<(RiskContribution, &'static [&'static str])> {
        let mut fired = Vec::new();

        if let Some(band) = first_band(self.attendance, signals.average_attendance) {
            fired.push((
                RiskContribution {
                    factor: RiskFactor::Attendance,
                    band: band.band,
                    points: band.points,
                    cause: band.cause,
                },
                band.actions,
            ));
        }

        if let Some(band) = first_band(self.marks, signals.average_marks) {
            fired.push((
                RiskContribution {
                    factor: RiskFactor::Marks,
                    band: band.band,
                    points: band.points,
                    cause: band.cause,
                },
                band.actions,
            ));
        }

        if signals.failing_subjects >= self.failing_subjects.at_least {
            fired.push((
                RiskContribution {
                    factor: RiskFactor::FailingSubjects,
                    band: "multiple",
                    points: self.failing_subjects.points,
                    cause: self.failing_subjects.cause,
                },
                self.failing_subjects.actions,
            ));
        }

        if signals.declining {
            fired.push((
                RiskContribution {
                    factor: RiskFactor::Trend,
                    band: "declining",
                    points: self.decline.points,
                    cause: self.decline.cause,
                },
                self.decline.actions,
            ));
        }

        fired
    }
}

impl RiskScorer for HeuristicScorer {
    fn score(&self, signals: &RiskSignals) -> RiskAssessment {
        let fired = self.fired(signals);

        // `fired` is already in precedence order, so a strict `>` keeps the
        // earlier factor on ties.
        let mut main: Option<&RiskContribution> = None;
        for (contribution, _) in &fired {
            if main.map_or(true, |best| contribution.points > best.points) {
                main = Some(contribution);
            }
        }
        let main_cause = main.map(|contribution| contribution.cause.to_string());

        let mut actions: Vec<String> = Vec::new();
        for action in fired.iter().flat_map(|(_, actions)| actions.iter()) {
            if !actions.iter().any(|existing| existing == action) {
                actions.push((*action).to_string());
            }
        }

        let contributions: Vec<RiskContribution> =
            fired.into_iter().map(|(contribution, _)| contribution).collect();
        let points: u32 = contributions.iter().map(|c| c.points).sum();
        let risk_score = normalize_points(points);

        RiskAssessment {
            risk_score,
            status: status_for(risk_score),
            main_cause,
            actions,
            contributions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(attendance: f64, marks: f64) -> RiskSignals {
        RiskSignals {
            average_attendance: attendance,
            average_marks: marks,
            failing_subjects: 0,
            declining: false,
        }
    }

    #[test]
    fn status_boundaries_are_strict() {
        assert_eq!(status_for(0.70), RiskStatus::Monitor);
        assert_eq!(status_for(0.71), RiskStatus::Critical);
        assert_eq!(status_for(0.40), RiskStatus::Safe);
        assert_eq!(status_for(0.41), RiskStatus::Monitor);
        assert_eq!(status_for(0.0), RiskStatus::Safe);
    }

    #[test]
    fn attendance_bands_follow_expected_tiers() {
        let scorer = HeuristicScorer::default();
        assert_eq!(scorer.score(&signals(59.9, 80.0)).points(), 40);
        assert_eq!(scorer.score(&signals(60.0, 80.0)).points(), 15);
        assert_eq!(scorer.score(&signals(74.9, 80.0)).points(), 15);
        assert_eq!(scorer.score(&signals(75.0, 80.0)).points(), 0);
    }

    #[test]
    fn marks_bands_follow_expected_tiers() {
        let scorer = HeuristicScorer::default();
        assert_eq!(scorer.score(&signals(90.0, 39.0)).points(), 30);
        assert_eq!(scorer.score(&signals(90.0, 40.0)).points(), 15);
        assert_eq!(scorer.score(&signals(90.0, 60.0)).points(), 0);
    }

    #[test]
    fn boundary_example_is_safe() {
        let assessment = HeuristicScorer::default().score(&RiskSignals {
            average_attendance: 50.0,
            average_marks: 60.0,
            failing_subjects: 1,
            declining: false,
        });
        assert_eq!(assessment.risk_score, 0.4);
        assert_eq!(assessment.status, RiskStatus::Safe);
        assert_eq!(
            assessment.main_cause.as_deref(),
            Some("Critical Attendance Failure")
        );
        assert_eq!(
            assessment.actions,
            vec!["Contact Parents", "Attendance Warning Letter"]
        );
    }

    #[test]
    fn everything_firing_stays_within_bounds() {
        let assessment = HeuristicScorer::default().score(&RiskSignals {
            average_attendance: 10.0,
            average_marks: 10.0,
            failing_subjects: 6,
            declining: true,
        });
        assert_eq!(assessment.points(), 95);
        assert!(assessment.risk_score <= 1.0);
        assert_eq!(assessment.status, RiskStatus::Critical);
        // "Subject Retake Plan" fires twice but is listed once.
        assert_eq!(
            assessment.actions,
            vec![
                "Contact Parents",
                "Attendance Warning Letter",
                "Remedial Session",
                "Subject Retake Plan",
                "Academic Advisor Review",
            ]
        );
    }

    #[test]
    fn ties_prefer_attendance_then_marks_then_trend() {
        let scorer = HeuristicScorer::default();
        let low_both = scorer.score(&signals(70.0, 50.0));
        assert_eq!(low_both.main_cause.as_deref(), Some("Low Attendance"));

        let marks_and_trend = scorer.score(&RiskSignals {
            declining: true,
            ..signals(90.0, 50.0)
        });
        assert_eq!(
            marks_and_trend.main_cause.as_deref(),
            Some("Low Academic Performance")
        );
    }

    #[test]
    fn highest_points_win_main_cause() {
        let assessment = HeuristicScorer::default().score(&signals(70.0, 30.0));
        assert_eq!(assessment.main_cause.as_deref(), Some("Academic Failure"));
        assert_eq!(assessment.risk_score, 0.45);
        assert_eq!(assessment.status, RiskStatus::Monitor);
    }

    #[test]
    fn clean_record_has_no_cause() {
        let assessment = HeuristicScorer::default().score(&signals(95.0, 88.0));
        assert_eq!(assessment.risk_score, 0.0);
        assert!(assessment.main_cause.is_none());
        assert!(assessment.actions.is_empty());
    }

    #[test]
    fn normalization_caps_at_one() {
        assert_eq!(normalize_points(140), 1.0);
        assert_eq!(normalize_points(70), 0.7);
    }
}
