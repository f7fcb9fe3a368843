//! Status oracle — the external authority on a change's approval state.
//!
//! Only `"canceled"` has engine-observable behavior; every other answer,
//! including errors and unknown statuses, leaves a change scheduled
//! (fail-open — an authority outage must not silently drop work).

use std::time::Duration;

use async_trait::async_trait;

/// The one status value the engine acts on.
pub const STATUS_CANCELED: &str = "canceled";

/// External authority answering "what is this change's current state".
#[async_trait]
pub trait StatusOracle: Send + Sync {
    /// Query the current status of a change. `Ok(None)` means the authority
    /// answered but reported no status.
    async fn check(&self, change_number: &str) -> Result<Option<String>, String>;
}

/// Fail-open reading of an oracle answer: only a definite "canceled"
/// retires a change.
pub fn reports_canceled(outcome: &Result<Option<String>, String>) -> bool {
    matches!(outcome, Ok(Some(status)) if status == STATUS_CANCELED)
}

/// Status oracle backed by an HTTP endpoint answering
/// `GET {endpoint}?change_number={id}` with a JSON `{"status": ...}` body.
pub struct HttpStatusOracle {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpStatusOracle {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl StatusOracle for HttpStatusOracle {
    async fn check(&self, change_number: &str) -> Result<Option<String>, String> {
        let url = format!("{}?change_number={}", self.endpoint, change_number);
        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("Status request failed: {e}"))?;

        if !resp.status().is_success() {
            return Err(format!("Status endpoint returned {}", resp.status()));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| format!("Status response decode failed: {e}"))?;
        let status = body
            .get("status")
            .and_then(|s| s.as_str())
            .map(str::to_string);
        tracing::debug!(
            "Change {change_number} status: {}",
            status.as_deref().unwrap_or("unknown")
        );
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_canceled_only_on_exact_status() {
        assert!(reports_canceled(&Ok(Some("canceled".into()))));
        assert!(!reports_canceled(&Ok(Some("approved".into()))));
        assert!(!reports_canceled(&Ok(Some("CANCELED".into()))));
        assert!(!reports_canceled(&Ok(None)));
        assert!(!reports_canceled(&Err("timeout".into())));
    }
}
