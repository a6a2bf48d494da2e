//! Academic risk engine: ingests per-subject student results from CSV,
//! consolidates them per student, and derives grades, GPA, subject alerts,
//! risk scores, semester trends and cohort dashboards.

pub mod alerts;
pub mod config;
pub mod consolidate;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod gpa;
pub mod models;
pub mod normalize;
pub mod report;
pub mod risk;
pub mod store;
pub mod telemetry;
pub mod trend;

pub use consolidate::Dataset;
pub use error::{EngineError, RowError};
pub use models::Scope;
pub use store::{Engine, IngestSummary, Overview, ResetSummary};
