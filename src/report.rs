use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dashboard::AlertEntry;
use crate::store::Overview;
use crate::trend::has_trend;

const REPORT_STUDENTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CauseSummary {
    pub cause: String,
    pub count: usize,
    pub avg_risk: f64,
}

pub fn summarize_by_cause(alerts: &[AlertEntry]) -> Vec<CauseSummary> {
    let mut map: HashMap<&str, (usize, f64)> = HashMap::new();

    for alert in alerts {
        let entry = map.entry(alert.main_cause.as_str()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += alert.risk_score;
    }

    let mut summaries: Vec<CauseSummary> = map
        .into_iter()
        .map(|(cause, (count, total_risk))| CauseSummary {
            cause: cause.to_string(),
            count,
            avg_risk: if count == 0 {
                0.0
            } else {
                total_risk / count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.cause.cmp(&b.cause)));
    summaries
}

pub fn build_report(source: &str, generated_at: DateTime<Utc>, overview: &Overview) -> String {
    let stats = &overview.stats;
    let causes = summarize_by_cause(&overview.alerts);

    let mut output = String::new();

    let _ = writeln!(output, "# Academic Risk Report");
    let _ = writeln!(
        output,
        "Generated for {} at {} (scope: {})",
        source,
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        stats.scope
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Cohort Summary");

    if stats.total_students == 0 {
        let _ = writeln!(output, "No student records loaded.");
    } else {
        let _ = writeln!(
            output,
            "- {} students, {} subject records",
            stats.total_students, stats.total_records
        );
        let _ = writeln!(
            output,
            "- Average marks {:.1}%, average attendance {:.1}%",
            stats.average_marks, stats.average_attendance
        );
        let _ = writeln!(
            output,
            "- {} students with subject alerts, {} with a declining SGPA",
            stats.students_with_alerts, stats.declining_students
        );
        let risk = &stats.risk_distribution;
        let _ = writeln!(
            output,
            "- Risk status: {} critical, {} monitor, {} safe",
            risk.critical, risk.monitor, risk.safe
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Grade Mix");
    let graded: Vec<_> = stats
        .grade_distribution
        .iter()
        .filter(|grade| grade.count > 0)
        .collect();
    if graded.is_empty() {
        let _ = writeln!(output, "No graded subjects.");
    } else {
        for grade in graded {
            let _ = writeln!(output, "- {}: {}", grade.grade, grade.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Causes");
    if causes.is_empty() {
        let _ = writeln!(output, "No students above the alert threshold.");
    } else {
        for cause in causes.iter() {
            let _ = writeln!(
                output,
                "- {}: {} students (avg risk {:.2})",
                cause.cause, cause.count, cause.avg_risk
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Students");
    if overview.alerts.is_empty() {
        let _ = writeln!(output, "No students above the alert threshold.");
    } else {
        for alert in overview.alerts.iter().take(REPORT_STUDENTS) {
            let _ = writeln!(
                output,
                "- {} ({}) risk {:.2} [{}], attendance {:.1}%, marks {:.1}%: {}",
                alert.name,
                alert.roll_number,
                alert.risk_score,
                alert.status,
                alert.attendance,
                alert.marks,
                alert.main_cause
            );
            if !alert.actions.is_empty() {
                let _ = writeln!(output, "  - Actions: {}", alert.actions.join(", "));
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Semester Trend");
    if !has_trend(&overview.trend) {
        let _ = writeln!(output, "No trend available without multi-semester data.");
    } else {
        for point in overview.trend.iter() {
            let _ = writeln!(output, "- {}: {:.2}", point.label, point.value);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## GPA Analytics");
    if overview.gpa.is_empty() {
        let _ = writeln!(output, "No GPA analytics without multi-semester data.");
    } else {
        for band in overview.gpa.distribution.iter().filter(|band| band.count > 0) {
            let _ = writeln!(output, "- SGPA {}: {} semesters", band.band, band.count);
        }
        let _ = writeln!(output);
        let _ = writeln!(output, "### Top Performers");
        for performer in overview.gpa.top_performers.iter() {
            let _ = write!(
                output,
                "- {} ({}) CGPA {:.2}",
                performer.name, performer.roll_number, performer.cgpa
            );
            match performer.reported_cgpa {
                Some(reported) => {
                    let _ = writeln!(output, " (reported {reported:.2})");
                }
                None => {
                    let _ = writeln!(output);
                }
            }
        }
    }

    output
}
