use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;

use crate::consolidate::Dataset;
use crate::models::{mean, round_to, Scope, TrendPoint};

/// Semesters inspected by [`is_declining`].
pub const DECLINE_WINDOW: usize = 3;

/// True when SGPA fell at every step across the most recent semesters: the
/// last two steps when there are three or more points, the only step when
/// there are two.
pub fn is_declining(sgpas: &[f64]) -> bool {
    if sgpas.len() < 2 {
        return false;
    }
    let window = &sgpas[sgpas.len().saturating_sub(DECLINE_WINDOW)..];
    window.windows(2).all(|pair| pair[1] < pair[0])
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendMetric {
    #[default]
    Sgpa,
    Marks,
}

impl FromStr for TrendMetric {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sgpa" => Ok(TrendMetric::Sgpa),
            "marks" => Ok(TrendMetric::Marks),
            other => Err(format!("unknown trend metric `{other}` (expected `sgpa` or `marks`)")),
        }
    }
}

/// One point per semester, ascending. `Sgpa` averages each student's SGPA
/// for the semester; `Marks` averages every subject's percentage. Datasets
/// without full history have no series.
pub fn cohort_trend(dataset: &Dataset, metric: TrendMetric) -> Vec<TrendPoint> {
    if dataset.scope() != Scope::Multi {
        return Vec::new();
    }

    let mut by_semester: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    match metric {
        TrendMetric::Sgpa => {
            for profile in dataset.students() {
                for snapshot in profile.snapshots(Scope::Multi) {
                    by_semester
                        .entry(snapshot.semester)
                        .or_default()
                        .push(snapshot.sgpa());
                }
            }
        }
        TrendMetric::Marks => {
            for record in dataset.records() {
                by_semester
                    .entry(record.semester)
                    .or_default()
                    .push(record.marks);
            }
        }
    }

    by_semester
        .into_iter()
        .map(|(semester, values)| TrendPoint {
            label: format!("Sem {semester}"),
            semester,
            value: round_to(mean(values), 2),
        })
        .collect()
}

/// A series of fewer than two points carries no trend.
pub fn has_trend(series: &[TrendPoint]) -> bool {
    series.len() >= 2
}
