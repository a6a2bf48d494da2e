use std::sync::Arc;
use std::thread;

use academic_risk::risk::RiskStatus;
use academic_risk::trend::TrendMetric;
use academic_risk::{Engine, EngineError, Scope};

const HEADER: &str = "roll_number,name,email,course,semester,subject_name,marks_obtained,total_marks,attendance_percentage,subject_credits,cgpa";

fn csv(rows: &[&str]) -> String {
    let mut body = String::from(HEADER);
    for row in rows {
        body.push('\n');
        body.push_str(row);
    }
    body.push('\n');
    body
}

fn history() -> String {
    csv(&[
        "EE01,Priya Nair,priya@example.edu,B.Tech EEE,1,Circuits,90,100,95,4,9.6",
        "EE01,Priya Nair,priya@example.edu,B.Tech EEE,1,Signals,85,100,93,4,9.6",
        "EE01,Priya Nair,priya@example.edu,B.Tech EEE,2,Machines,92,100,94,4,9.6",
        "ee02,Tomas Berg,tomas@example.edu,B.Tech EEE,1,Circuits,88,100,80,4,8.0",
        "EE02,Tomas Berg,tomas@example.edu,B.Tech EEE,2,Machines,72,100,80,4,8.0",
        "EE02,Tomas Berg,tomas@example.edu,B.Tech EEE,3,Power Systems,65,100,80,4,8.0",
        "EE03,Lena Fischer,lena@example.edu,B.Tech EEE,1,Circuits,45,100,70,4,4.2",
        "EE03,Lena Fischer,lena@example.edu,B.Tech EEE,2,Machines,38,100,58,4,4.2",
        "EE04,Broken Row,broken@example.edu,B.Tech EEE,two,Machines,38,100,58,4,4.2",
    ])
}

#[test]
fn multi_semester_pipeline() {
    let engine = Engine::new();
    let summary = engine.ingest(history().as_bytes(), Scope::Multi).unwrap();
    assert_eq!(summary.rows_read, 9);
    assert_eq!(summary.skipped_rows, 1);
    assert_eq!(summary.students, 3);
    assert_eq!(summary.total_records, 8);
    assert!(summary.message().contains("1 rows skipped"));

    let stats = engine.stats();
    assert!(stats.total_records >= stats.total_students);
    assert_eq!(stats.declining_students, 2);

    let alerts = engine.alerts(0.4);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].roll_number, "EE03");
    assert_eq!(alerts[0].risk_score, 0.45);
    assert_eq!(alerts[0].status, RiskStatus::Monitor);
    assert_eq!(alerts[0].main_cause, "Low Attendance");

    let declining = engine.explain("ee02").unwrap();
    assert!(declining.signals.declining);
    assert_eq!(declining.gpa.sgpa_sequence(), vec![9.0, 8.0, 7.0]);
    assert_eq!(declining.assessment.risk_score, 0.15);
    assert_eq!(declining.assessment.status, RiskStatus::Safe);

    let trend = engine.trend(TrendMetric::Sgpa);
    let labels: Vec<&str> = trend.iter().map(|point| point.label.as_str()).collect();
    assert_eq!(labels, vec!["Sem 1", "Sem 2", "Sem 3"]);
    let values: Vec<f64> = trend.iter().map(|point| point.value).collect();
    assert_eq!(values, vec![7.83, 6.0, 7.0]);

    let gpa = engine.gpa_analytics();
    assert_eq!(gpa.correlation.sgpa.len(), gpa.correlation.attendance.len());
    assert_eq!(gpa.top_performers[0].roll_number, "EE01");
    assert_eq!(gpa.top_performers[0].cgpa, 9.75);
    assert_eq!(gpa.top_performers[0].reported_cgpa, Some(9.6));
}

#[test]
fn later_semester_upload_replaces_that_semester() {
    let engine = Engine::new();
    engine.ingest(history().as_bytes(), Scope::Multi).unwrap();

    let retake = csv(&["EE03,Lena Fischer,lena@example.edu,B.Tech EEE,2,Machines,75,100,90,4,5.0"]);
    let summary = engine.ingest(retake.as_bytes(), Scope::Multi).unwrap();
    assert_eq!(summary.records_ingested, 1);
    assert_eq!(summary.total_records, 8);

    let insight = engine.explain("EE03").unwrap();
    assert_eq!(insight.gpa.sgpa_sequence(), vec![5.0, 8.0]);
    assert_eq!(insight.assessment.risk_score, 0.0);
    assert!(engine.alerts(0.4).is_empty());
}

#[test]
fn current_upload_replaces_history() {
    let engine = Engine::new();
    engine.ingest(history().as_bytes(), Scope::Multi).unwrap();

    let current = csv(&["EE09,Sam Okafor,sam@example.edu,B.Tech EEE,4,Drives,35,100,55,3,"]);
    engine.ingest(current.as_bytes(), Scope::Current).unwrap();

    let stats = engine.stats();
    assert_eq!(stats.total_students, 1);
    assert_eq!(stats.students_with_alerts, 1);
    assert!(engine.trend(TrendMetric::Sgpa).is_empty());
    assert!(engine.gpa_analytics().is_empty());
    assert_eq!(engine.alerts(0.4)[0].status, RiskStatus::Monitor);
}

#[test]
fn reingest_and_reset() {
    let engine = Engine::new();
    engine.ingest(history().as_bytes(), Scope::Multi).unwrap();
    let first = engine.overview(0.4, TrendMetric::Marks);

    engine.ingest(history().as_bytes(), Scope::Multi).unwrap();
    assert_eq!(engine.overview(0.4, TrendMetric::Marks), first);

    let reset = engine.reset().unwrap();
    assert_eq!(reset.students_removed, 3);
    assert_eq!(engine.stats().total_students, 0);
    assert!(engine.explain("EE01").is_none());
}

#[test]
fn unusable_uploads_are_rejected() {
    let engine = Engine::new();
    engine.ingest(history().as_bytes(), Scope::Multi).unwrap();
    let before = engine.snapshot();

    let garbage = csv(&["EE05,Nobody,n@example.edu,B.Tech EEE,1,Circuits,abc,100,90,4,7.0"]);
    assert!(matches!(
        engine.ingest(garbage.as_bytes(), Scope::Multi),
        Err(EngineError::NoValidRows { .. })
    ));
    assert!(matches!(
        engine.ingest("roll_number,name\nEE01,Priya\n".as_bytes(), Scope::Multi),
        Err(EngineError::Schema { .. })
    ));
    assert_eq!(engine.snapshot(), before);
}

#[test]
fn concurrent_readers_see_the_same_dataset() {
    let engine = Arc::new(Engine::new());
    engine.ingest(history().as_bytes(), Scope::Multi).unwrap();
    let expected = engine.overview(0.4, TrendMetric::Sgpa);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.overview(0.4, TrendMetric::Sgpa))
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}
