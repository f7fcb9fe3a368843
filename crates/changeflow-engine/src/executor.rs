//! Change execution — the outbound action fired when a change comes due.
//!
//! The engine dispatches execution fire-and-forget and only logs the
//! outcome; there is no retry policy.

use std::time::Duration;

use async_trait::async_trait;

use crate::task::ChangeTask;

/// External collaborator performing the deferred action.
#[async_trait]
pub trait ChangeExecutor: Send + Sync {
    /// Perform the action for a due change. Returns the HTTP status code of
    /// the outbound call.
    async fn execute(&self, task: &ChangeTask) -> Result<u16, String>;
}

/// Executor that fires a GET at the fixed target endpoint.
pub struct HttpExecutor {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpExecutor {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl ChangeExecutor for HttpExecutor {
    async fn execute(&self, task: &ChangeTask) -> Result<u16, String> {
        let resp = self
            .client
            .get(&self.endpoint)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                format!(
                    "HTTP request failed for change {}: {e}",
                    task.change_number
                )
            })?;
        Ok(resp.status().as_u16())
    }
}
