use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use academic_risk::config::{parse_min_risk, Config};
use academic_risk::dashboard::{AlertList, CohortStats, GpaAnalytics, RecordRow, StudentInsight};
use academic_risk::gpa::{self, WhatIfSubject};
use academic_risk::models::TrendPoint;
use academic_risk::normalize::normalize_roll;
use academic_risk::trend::TrendMetric;
use academic_risk::{db, report, telemetry, Engine, Scope};

#[derive(Parser)]
#[command(name = "academic-risk")]
#[command(about = "Academic performance aggregation and student risk scoring", long_about = None)]
struct Cli {
    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Ingest a CSV of subject results into the stored dataset
    Ingest {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "current")]
        scope: Scope,
    },
    /// Clear every stored student and record
    Reset,
    /// Cohort statistics
    Stats,
    /// Students above the alert threshold, highest risk first
    Alerts {
        #[arg(long, value_parser = parse_min_risk)]
        min_risk: Option<f64>,
        /// Show at most this many students
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Every stored subject record with its grade and alert
    Records {
        #[arg(long)]
        roll: Option<String>,
    },
    /// Cohort average per semester
    Trend {
        #[arg(long, default_value = "sgpa")]
        metric: TrendMetric,
    },
    /// SGPA distribution, attendance correlation and top performers
    Gpa,
    /// Break down one student's risk score
    Explain {
        #[arg(long)]
        roll: String,
    },
    /// Generate a markdown report from the stored dataset
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long, value_parser = parse_min_risk)]
        min_risk: Option<f64>,
    },
    /// Ingest a CSV in memory and print its report, without a database
    Analyze {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "current")]
        scope: Scope,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, value_parser = parse_min_risk)]
        min_risk: Option<f64>,
    },
    /// SGPA for a hypothetical set of subjects, each given as marks:credits
    WhatIf {
        #[arg(long = "subject", required = true)]
        subjects: Vec<WhatIfSubject>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    telemetry::init_tracing(config.log_format);

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Ingest { csv, scope } => {
            let pool = connect(&config).await?;
            let mut write = db::begin_write(&pool).await?;
            let engine = Engine::from_dataset(write.load().await?);
            let summary = engine.ingest(open_csv(&csv)?, scope)?;
            write.save(&engine.snapshot(), summary.run_id).await?;

            if cli.json {
                print_json(&summary)?;
            } else {
                println!("{}", summary.message());
            }
        }
        Commands::Reset => {
            let pool = connect(&config).await?;
            let mut write = db::begin_write(&pool).await?;
            let engine = Engine::from_dataset(write.load().await?);
            let summary = engine.reset()?;
            write.clear().await?;

            if cli.json {
                print_json(&summary)?;
            } else {
                println!("{}", summary.message());
            }
        }
        Commands::Stats => {
            let engine = load_engine(&connect(&config).await?).await?;
            let stats = engine.stats();
            if cli.json {
                print_json(&stats)?;
            } else {
                print_stats(&stats);
            }
        }
        Commands::Alerts { min_risk, limit } => {
            let engine = load_engine(&connect(&config).await?).await?;
            let min_risk = min_risk.unwrap_or(config.min_risk);
            let alerts = AlertList::new(engine.alerts(min_risk), limit);
            if cli.json {
                print_json(&alerts)?;
            } else {
                print_alerts(&alerts);
            }
        }
        Commands::Records { roll } => {
            let engine = load_engine(&connect(&config).await?).await?;
            let mut records = engine.records();
            if let Some(roll) = roll {
                let roll = normalize_roll(&roll);
                records.retain(|record| record.roll_number == roll);
            }
            if cli.json {
                print_json(&records)?;
            } else {
                print_records(&records);
            }
        }
        Commands::Trend { metric } => {
            let engine = load_engine(&connect(&config).await?).await?;
            let trend = engine.trend(metric);
            if cli.json {
                print_json(&trend)?;
            } else {
                print_trend(&trend);
            }
        }
        Commands::Gpa => {
            let engine = load_engine(&connect(&config).await?).await?;
            let analytics = engine.gpa_analytics();
            if cli.json {
                print_json(&analytics)?;
            } else {
                print_gpa(&analytics);
            }
        }
        Commands::Explain { roll } => {
            let engine = load_engine(&connect(&config).await?).await?;
            let insight = engine
                .explain(&roll)
                .with_context(|| format!("no student with roll number {}", normalize_roll(&roll)))?;
            if cli.json {
                print_json(&insight)?;
            } else {
                print_insight(&insight);
            }
        }
        Commands::Report { out, min_risk } => {
            let pool = connect(&config).await?;
            let engine = load_engine(&pool).await?;
            let source = match db::fetch_state(&pool).await? {
                Some(state) => format!(
                    "run {} (stored {})",
                    state.last_run_id,
                    state.updated_at.format("%Y-%m-%d %H:%M UTC")
                ),
                None => "an empty database".to_string(),
            };
            let min_risk = min_risk.unwrap_or(config.min_risk);
            let overview = engine.overview(min_risk, TrendMetric::Sgpa);
            let report = report::build_report(&source, Utc::now(), &overview);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Analyze {
            csv,
            scope,
            out,
            min_risk,
        } => {
            let engine = Engine::new();
            let summary = engine.ingest(open_csv(&csv)?, scope)?;
            let min_risk = min_risk.unwrap_or(config.min_risk);
            let overview = engine.overview(min_risk, TrendMetric::Sgpa);

            if cli.json {
                print_json(&overview)?;
                return Ok(());
            }

            eprintln!("{}", summary.message());
            let source = csv.display().to_string();
            let report = report::build_report(&source, Utc::now(), &overview);
            match out {
                Some(out) => {
                    std::fs::write(&out, report)
                        .with_context(|| format!("failed to write {}", out.display()))?;
                    println!("Report written to {}.", out.display());
                }
                None => print!("{report}"),
            }
        }
        Commands::WhatIf { subjects } => {
            let sgpa = gpa::what_if(&subjects);
            if cli.json {
                print_json(&serde_json::json!({ "sgpa": sgpa }))?;
            } else {
                println!("What-if SGPA: {sgpa:.2}");
            }
        }
    }

    Ok(())
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.database_url()?)
        .await
        .context("failed to connect to Postgres")
}

async fn load_engine(pool: &PgPool) -> anyhow::Result<Engine> {
    let dataset = db::load_dataset(pool).await?;
    Ok(Engine::from_dataset(dataset))
}

fn open_csv(path: &Path) -> anyhow::Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_stats(stats: &CohortStats) {
    if stats.total_students == 0 {
        println!("No student records loaded.");
        return;
    }

    println!("Cohort statistics (scope: {}):", stats.scope);
    println!("- Students: {}", stats.total_students);
    println!("- Subject records: {}", stats.total_records);
    println!("- Average marks: {:.1}%", stats.average_marks);
    println!("- Average attendance: {:.1}%", stats.average_attendance);
    println!("- Students with alerts: {}", stats.students_with_alerts);
    println!("- Declining students: {}", stats.declining_students);
    println!(
        "- Risk: {} critical, {} monitor, {} safe",
        stats.risk_distribution.critical,
        stats.risk_distribution.monitor,
        stats.risk_distribution.safe
    );
    println!("Grade distribution:");
    for grade in stats.grade_distribution.iter() {
        println!("- {}: {}", grade.grade, grade.count);
    }
}

fn print_alerts(list: &AlertList) {
    if list.alerts.is_empty() {
        println!("No students above the alert threshold.");
        return;
    }

    println!("Students by risk score:");
    for alert in list.alerts.iter() {
        println!(
            "- {} ({}) risk {:.2}, attendance {:.1}%, marks {:.1}%: {}",
            alert.name,
            alert.roll_number,
            alert.risk_score,
            alert.attendance,
            alert.marks,
            alert.message
        );
        if !alert.actions.is_empty() {
            println!("  actions: {}", alert.actions.join(", "));
        }
    }
    if list.is_truncated() {
        println!(
            "Showing {} of {} students above the threshold.",
            list.alerts.len(),
            list.total
        );
    }
}

fn print_records(records: &[RecordRow]) {
    if records.is_empty() {
        println!("No records found.");
        return;
    }

    for record in records {
        println!(
            "- {} Sem {} {}: {}/{} ({:.2}%, {}), {} credits, attendance {:.1}%, \
             alert {}, risk {:.2}",
            record.roll_number,
            record.semester,
            record.subject,
            record.marks_obtained,
            record.total_marks,
            record.percentage,
            record.grade,
            record.credits,
            record.attendance,
            record.subject_alert,
            record.risk_score
        );
    }
}

fn print_trend(trend: &[TrendPoint]) {
    if trend.is_empty() {
        println!("No trend available without multi-semester data.");
        return;
    }

    for point in trend {
        println!("- {}: {:.2}", point.label, point.value);
    }
}

fn print_gpa(analytics: &GpaAnalytics) {
    if analytics.is_empty() {
        println!("No GPA analytics without multi-semester data.");
        return;
    }

    println!("SGPA distribution:");
    for band in analytics.distribution.iter() {
        println!("- {}: {}", band.band, band.count);
    }
    println!("Top performers:");
    for performer in analytics.top_performers.iter() {
        println!(
            "- {} ({}) CGPA {:.2}",
            performer.name, performer.roll_number, performer.cgpa
        );
    }
}

fn print_insight(insight: &StudentInsight) {
    let assessment = &insight.assessment;
    println!(
        "{} ({}), {}, {}",
        insight.name, insight.roll_number, insight.course, insight.email
    );
    println!(
        "- Average attendance {:.1}%, average marks {:.1}%, {} failing subjects{}",
        insight.signals.average_attendance,
        insight.signals.average_marks,
        insight.signals.failing_subjects,
        if insight.signals.declining {
            ", SGPA declining"
        } else {
            ""
        }
    );

    if assessment.contributions.is_empty() {
        println!("- No risk factors fired.");
    }
    for contribution in assessment.contributions.iter() {
        println!(
            "- {} ({} band): +{} points",
            contribution.cause, contribution.band, contribution.points
        );
    }
    println!(
        "Risk {:.2} from {} points: {}",
        assessment.risk_score,
        assessment.points(),
        assessment.status
    );
    if let Some(cause) = &assessment.main_cause {
        println!("Main cause: {cause}");
    }
    if !assessment.actions.is_empty() {
        println!("Actions: {}", assessment.actions.join(", "));
    }

    for semester in insight.gpa.semesters.iter() {
        println!(
            "- Sem {}: SGPA {:.2}, attendance {:.1}%",
            semester.semester, semester.sgpa, semester.attendance
        );
    }
    if let Some(cgpa) = insight.gpa.cgpa {
        println!("CGPA {cgpa:.2}");
    }
}
