//! Test doubles for the collaborator ports, shared by the engine and
//! sweep tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use changeflow_core::config::SchedulerConfig;
use changeflow_core::time::format_datetime;

use crate::engine::SchedulerEngine;
use crate::executor::ChangeExecutor;
use crate::oracle::StatusOracle;
use crate::store::TaskStore;
use crate::task::ChangeTask;

/// Oracle answering from a programmable status table. Unlisted changes get
/// `Ok(None)` ("unknown"); `fail_all` switches every answer to an error.
pub(crate) struct ScriptedOracle {
    statuses: Mutex<HashMap<String, String>>,
    fail: AtomicBool,
}

impl ScriptedOracle {
    pub(crate) fn new() -> Self {
        Self {
            statuses: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub(crate) fn set(&self, change_number: &str, status: &str) {
        self.statuses
            .lock()
            .unwrap()
            .insert(change_number.to_string(), status.to_string());
    }

    pub(crate) fn fail_all(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatusOracle for ScriptedOracle {
    async fn check(&self, change_number: &str) -> Result<Option<String>, String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("status endpoint unreachable".to_string());
        }
        Ok(self.statuses.lock().unwrap().get(change_number).cloned())
    }
}

/// Executor that records every dispatch with its wall-clock instant.
pub(crate) struct RecordingExecutor {
    calls: Mutex<Vec<(String, DateTime<Utc>)>>,
}

impl RecordingExecutor {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn executed(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub(crate) fn executed_at(&self) -> Vec<(String, DateTime<Utc>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChangeExecutor for RecordingExecutor {
    async fn execute(&self, task: &ChangeTask) -> Result<u16, String> {
        self.calls
            .lock()
            .unwrap()
            .push((task.change_number.clone(), Utc::now()));
        Ok(200)
    }
}

pub(crate) fn test_config(status_check_interval_secs: u64) -> SchedulerConfig {
    SchedulerConfig {
        status_check_interval_secs,
        ..SchedulerConfig::default()
    }
}

pub(crate) fn store_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("changeflow-test-{name}"))
}

/// Engine wired to a fresh temp store, a scripted oracle, and a recording
/// executor.
pub(crate) fn test_engine(
    name: &str,
    status_check_interval_secs: u64,
) -> (SchedulerEngine, Arc<ScriptedOracle>, Arc<RecordingExecutor>) {
    let dir = store_dir(name);
    std::fs::remove_dir_all(&dir).ok();
    let oracle = Arc::new(ScriptedOracle::new());
    let executor = Arc::new(RecordingExecutor::new());
    let engine = SchedulerEngine::new(
        &test_config(status_check_interval_secs),
        TaskStore::new(&dir),
        oracle.clone(),
        executor.clone(),
    );
    (engine, oracle, executor)
}

/// Wire-format timestamp `n` seconds from now (negative for the past).
pub(crate) fn in_secs(n: i64) -> String {
    format_datetime(Utc::now() + Duration::seconds(n))
}
