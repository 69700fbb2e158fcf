mod support;

use runwright::plan_run::PlanRunState;
use runwright::shared::logging::{FileLogger, LogLevel, RunLogger};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use support::{memory_engine, ready_tools, three_step_plan, ScriptedAgents};

#[test]
fn shared_logging_module_file_logger_writes_json_lines() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("logs").join("runs.log");
    let logger = FileLogger::new(&path);

    logger.log(LogLevel::Info, "plan_run_state", "run_id=prun-1 from=NOT_STARTED to=IN_PROGRESS");
    logger.log(LogLevel::Warn, "wait_timeout", "run_id=prun-1 retries=6");

    let raw = fs::read_to_string(logger.path()).expect("read log");
    let lines: Vec<Value> = raw
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["level"], "info");
    assert_eq!(lines[0]["event"], "plan_run_state");
    assert_eq!(lines[1]["level"], "warn");
    assert_eq!(lines[1]["message"], "run_id=prun-1 retries=6");
    assert!(lines[1]["timestamp"].as_i64().is_some_and(|ts| ts > 0));
}

#[test]
fn shared_logging_module_level_names() {
    assert_eq!(LogLevel::Debug.as_str(), "debug");
    assert_eq!(LogLevel::Error.as_str(), "error");
}

#[test]
fn shared_logging_module_engine_reports_run_lifecycle() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("engine.log");
    let engine = memory_engine(ready_tools(), ScriptedAgents::failing_at(2))
        .with_logger(Arc::new(FileLogger::new(&path)));

    let run = engine
        .run_plan(&three_step_plan(), None, BTreeMap::new())
        .expect("run plan");
    assert_eq!(run.state, PlanRunState::Failed);

    let raw = fs::read_to_string(&path).expect("read log");
    let events: Vec<String> = raw
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).expect("json line"))
        .filter_map(|line| line["event"].as_str().map(str::to_string))
        .collect();
    for expected in ["plan_run_created", "step_started", "step_output", "step_failed"] {
        assert!(
            events.iter().any(|event| event == expected),
            "missing {expected} in {events:?}"
        );
    }
    assert!(raw.contains(&format!("run_id={}", run.id)));
    assert!(raw.contains("boom at step 2"));
}
