//! The engine: one consolidated dataset behind a read/write lock, with a
//! non-blocking gate so that at most one write (ingest or reset) runs at a
//! time. Readers never see a half-built dataset: a new one is built off to
//! the side and swapped in whole.

use std::io::Read;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, TryLockError};

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::consolidate::{consolidate, Dataset};
use crate::dashboard::{self, AlertEntry, CohortStats, GpaAnalytics, RecordRow, StudentInsight};
use crate::error::EngineError;
use crate::models::{Scope, TrendPoint};
use crate::normalize::read_upload;
use crate::risk::{HeuristicScorer, RiskScorer};
use crate::trend::{self, TrendMetric};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    pub run_id: Uuid,
    pub scope: Scope,
    pub rows_read: usize,
    pub records_ingested: usize,
    pub duplicates_replaced: usize,
    pub skipped_rows: usize,
    pub students: usize,
    pub total_records: usize,
}

impl IngestSummary {
    pub fn message(&self) -> String {
        let mut message = format!(
            "Analysis complete (scope: {}): {} students, {} records ingested",
            self.scope, self.students, self.records_ingested
        );
        if self.skipped_rows > 0 {
            message.push_str(&format!(", {} rows skipped", self.skipped_rows));
        }
        if self.duplicates_replaced > 0 {
            message.push_str(&format!(
                ", {} duplicate rows replaced",
                self.duplicates_replaced
            ));
        }
        message.push('.');
        message
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResetSummary {
    pub students_removed: usize,
    pub records_removed: usize,
}

impl ResetSummary {
    pub fn message(&self) -> String {
        format!(
            "Dataset cleared successfully ({} students, {} records removed).",
            self.students_removed, self.records_removed
        )
    }
}

pub struct Engine<S = HeuristicScorer> {
    dataset: RwLock<Dataset>,
    write_gate: Mutex<()>,
    scorer: S,
}

impl Default for Engine<HeuristicScorer> {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine<HeuristicScorer> {
    pub fn new() -> Self {
        Self::with_scorer(HeuristicScorer::default())
    }

    /// An engine seeded with a previously stored dataset.
    pub fn from_dataset(dataset: Dataset) -> Self {
        let engine = Self::new();
        *engine.dataset.write().unwrap_or_else(PoisonError::into_inner) = dataset;
        engine
    }
}

impl<S: RiskScorer> Engine<S> {
    pub fn with_scorer(scorer: S) -> Self {
        Self {
            dataset: RwLock::new(Dataset::default()),
            write_gate: Mutex::new(()),
            scorer,
        }
    }

    fn begin_write(&self, operation: &'static str) -> Result<MutexGuard<'_, ()>, EngineError> {
        match self.write_gate.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                warn!(operation, "rejected write while another write is in progress");
                Err(EngineError::WriteInProgress)
            }
        }
    }

    /// Ingests a CSV upload. `current` replaces the dataset; `multi` merges
    /// into an existing `multi` dataset semester by semester. On any error
    /// the previous dataset is left exactly as it was.
    pub fn ingest<R: Read>(&self, reader: R, scope: Scope) -> Result<IngestSummary, EngineError> {
        let _write = self.begin_write("ingest")?;
        let run_id = Uuid::new_v4();

        let upload = read_upload(reader, scope)?;
        let consolidation = consolidate(upload.rows, scope);

        let mut dataset = self.dataset.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::take(&mut *dataset);
        *dataset = previous.merge(consolidation.dataset);

        let summary = IngestSummary {
            run_id,
            scope,
            rows_read: upload.rows_read,
            records_ingested: consolidation.records_ingested,
            duplicates_replaced: consolidation.duplicates_replaced,
            skipped_rows: upload.skipped,
            students: dataset.total_students(),
            total_records: dataset.total_records(),
        };
        info!(
            %run_id,
            %scope,
            rows_read = summary.rows_read,
            skipped = summary.skipped_rows,
            students = summary.students,
            records = summary.total_records,
            "ingest complete"
        );
        Ok(summary)
    }

    pub fn reset(&self) -> Result<ResetSummary, EngineError> {
        let _write = self.begin_write("reset")?;
        let mut dataset = self.dataset.write().unwrap_or_else(PoisonError::into_inner);
        let cleared = std::mem::take(&mut *dataset);

        let summary = ResetSummary {
            students_removed: cleared.total_students(),
            records_removed: cleared.total_records(),
        };
        info!(
            students = summary.students_removed,
            records = summary.records_removed,
            "dataset reset"
        );
        Ok(summary)
    }

    fn read<T>(&self, f: impl FnOnce(&Dataset, &S) -> T) -> T {
        let dataset = self.dataset.read().unwrap_or_else(PoisonError::into_inner);
        f(&dataset, &self.scorer)
    }

    /// A copy of the current dataset, e.g. for persisting it.
    pub fn snapshot(&self) -> Dataset {
        self.read(|dataset, _| dataset.clone())
    }

    pub fn stats(&self) -> CohortStats {
        self.read(|dataset, scorer| {
            let summaries = dashboard::evaluate(dataset, scorer);
            dashboard::cohort_stats(dataset, &summaries)
        })
    }

    pub fn alerts(&self, min_risk: f64) -> Vec<AlertEntry> {
        self.read(|dataset, scorer| {
            dashboard::ranked_alerts(&dashboard::evaluate(dataset, scorer), min_risk)
        })
    }

    pub fn records(&self) -> Vec<RecordRow> {
        self.read(|dataset, scorer| dashboard::record_table(&dashboard::evaluate(dataset, scorer)))
    }

    pub fn trend(&self, metric: TrendMetric) -> Vec<TrendPoint> {
        self.read(|dataset, _| trend::cohort_trend(dataset, metric))
    }

    pub fn gpa_analytics(&self) -> GpaAnalytics {
        self.read(|dataset, scorer| {
            dashboard::gpa_analytics(dataset.scope(), &dashboard::evaluate(dataset, scorer))
        })
    }

    pub fn explain(&self, roll_number: &str) -> Option<StudentInsight> {
        self.read(|dataset, scorer| {
            dataset.student(roll_number).map(|profile| {
                StudentInsight::from(&dashboard::summarize(profile, dataset.scope(), scorer))
            })
        })
    }

    /// Stats, alerts, trend and GPA analytics from one consistent view.
    pub fn overview(&self, min_risk: f64, metric: TrendMetric) -> Overview {
        self.read(|dataset, scorer| {
            let summaries = dashboard::evaluate(dataset, scorer);
            Overview {
                stats: dashboard::cohort_stats(dataset, &summaries),
                alerts: dashboard::ranked_alerts(&summaries, min_risk),
                trend: trend::cohort_trend(dataset, metric),
                gpa: dashboard::gpa_analytics(dataset.scope(), &summaries),
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub stats: CohortStats,
    pub alerts: Vec<AlertEntry>,
    pub trend: Vec<TrendPoint>,
    pub gpa: GpaAnalytics,
}
