//! Task definitions — the record for a single scheduled change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A change pending implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeTask {
    /// Caller-supplied change number. Unique within the pending set.
    pub change_number: String,
    /// When the change fires.
    pub implementation_time: DateTime<Utc>,
    /// When the change was accepted into the schedule.
    pub created_at: DateTime<Utc>,
    /// Opaque caller payload, carried through unmodified.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ChangeTask {
    /// Create a new task record due at `implementation_time`.
    pub fn new(
        change_number: &str,
        implementation_time: DateTime<Utc>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            change_number: change_number.to_string(),
            implementation_time,
            created_at: Utc::now(),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_defaults_to_null() {
        let json = r#"{
            "change_number": "CHG1",
            "implementation_time": "2026-05-06T10:00:00Z",
            "created_at": "2026-05-06T00:00:00Z"
        }"#;
        let task: ChangeTask = serde_json::from_str(json).unwrap();
        assert_eq!(task.change_number, "CHG1");
        assert!(task.metadata.is_null());
    }
}
