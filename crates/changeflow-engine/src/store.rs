//! File-based task store — lightweight persistence.
//! The pending set is snapshotted as one JSON array — human-readable,
//! rewritten in full on every mutation, read back once at startup.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::task::ChangeTask;

/// File-based snapshot store for pending changes.
pub struct TaskStore {
    path: PathBuf,
    /// Serializes snapshot writes dispatched from detached tasks.
    write_lock: Mutex<()>,
}

impl TaskStore {
    /// Create a new task store at the given directory.
    pub fn new(dir: &Path) -> Self {
        std::fs::create_dir_all(dir).ok();
        Self {
            path: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Default store path (~/.changeflow/data).
    pub fn default_path() -> PathBuf {
        changeflow_core::ChangeflowConfig::home_dir().join("data")
    }

    /// Write a full snapshot of the pending set.
    pub fn save(&self, tasks: &[ChangeTask]) -> Result<(), String> {
        let file = self.path.join("scheduled_tasks.json");
        let json =
            serde_json::to_string_pretty(tasks).map_err(|e| format!("Serialize error: {e}"))?;
        let _guard = self.write_lock.lock().unwrap();
        std::fs::write(&file, &json).map_err(|e| format!("Write error: {e}"))?;
        tracing::debug!("💾 Saved {} task(s) to {}", tasks.len(), file.display());
        Ok(())
    }

    /// Load the last snapshot. Missing or unreadable files yield an empty
    /// schedule — startup must not fail on a bad snapshot.
    pub fn load(&self) -> Vec<ChangeTask> {
        let file = self.path.join("scheduled_tasks.json");
        if !file.exists() {
            tracing::info!("Tasks file not found: {}", file.display());
            return Vec::new();
        }
        match std::fs::read_to_string(&file) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Failed to parse scheduled_tasks.json: {e}");
                Vec::new()
            }),
            Err(e) => {
                tracing::warn!("⚠️ Failed to read scheduled_tasks.json: {e}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join("changeflow-test-store");
        let store = TaskStore::new(&dir);

        let tasks = vec![
            ChangeTask::new("CHG1", Utc::now(), serde_json::Value::Null),
            ChangeTask::new("CHG2", Utc::now(), serde_json::json!({"owner": "ops"})),
        ];
        store.save(&tasks).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].change_number, "CHG1");
        assert_eq!(loaded[1].metadata["owner"], "ops");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = std::env::temp_dir().join("changeflow-test-store-empty");
        std::fs::remove_dir_all(&dir).ok();
        let store = TaskStore::new(&dir);
        assert!(store.load().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }
}
