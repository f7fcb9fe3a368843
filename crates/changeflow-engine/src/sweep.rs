//! Status sweep — periodic eviction of externally canceled changes.
//!
//! On each period the sweep snapshots the pending change numbers, asks the
//! status oracle about each one sequentially outside the lock, then evicts
//! the canceled batch under one lock followed by a single snapshot write.
//! A change whose status cannot be read stays scheduled this cycle.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{EngineInner, POLL_QUANTUM};
use crate::oracle::STATUS_CANCELED;

/// Extended pause after a sweep-level failure so a systemic problem does
/// not spin the loop.
const SWEEP_BACKOFF: Duration = Duration::from_secs(10);

pub(crate) async fn run_sweep_loop(inner: Arc<EngineInner>) {
    tracing::info!(
        "🔎 Status sweep started (checking every {}s)",
        inner.sweep_interval.as_secs()
    );
    while inner.running.load(Ordering::SeqCst) {
        // Sleep first, in poll-quantum increments, so stop() is observed
        // within one quantum rather than one full sweep period.
        let mut remaining = inner.sweep_interval;
        while !remaining.is_zero() && inner.running.load(Ordering::SeqCst) {
            let nap = remaining.min(POLL_QUANTUM);
            tokio::time::sleep(nap).await;
            remaining = remaining.saturating_sub(nap);
        }
        if !inner.running.load(Ordering::SeqCst) {
            break;
        }

        match sweep_once(&inner).await {
            Ok(0) => {}
            Ok(evicted) => tracing::info!("🧹 Sweep evicted {evicted} canceled change(s)"),
            Err(e) => {
                tracing::error!("Sweep failed: {e}");
                tokio::time::sleep(SWEEP_BACKOFF).await;
            }
        }
    }
    tracing::info!("Status sweep stopped");
}

/// One full pass over the pending set. Returns how many changes were
/// evicted as canceled.
pub(crate) async fn sweep_once(inner: &EngineInner) -> Result<usize, String> {
    let change_numbers = inner
        .pending
        .lock()
        .map_err(|_| "pending set lock poisoned".to_string())?
        .change_numbers();
    if change_numbers.is_empty() {
        return Ok(0);
    }
    tracing::debug!("Checking status for {} change(s)", change_numbers.len());

    let mut canceled = Vec::new();
    for change_number in change_numbers {
        match inner.oracle.check(&change_number).await {
            Ok(Some(status)) if status == STATUS_CANCELED => canceled.push(change_number),
            Ok(_) => {}
            // Fail-open per change: log and move on to the next one.
            Err(e) => {
                tracing::warn!("⚠️ Status check for change {change_number} failed: {e}");
            }
        }
    }
    if canceled.is_empty() {
        return Ok(0);
    }

    let mut evicted = 0;
    {
        let mut pending = inner
            .pending
            .lock()
            .map_err(|_| "pending set lock poisoned".to_string())?;
        for change_number in &canceled {
            if pending.remove(change_number).is_some() {
                tracing::info!("Removing change {change_number} as it was canceled");
                evicted += 1;
            }
        }
    }
    if evicted > 0 {
        inner.snapshot();
    }
    Ok(evicted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{in_secs, test_engine};

    #[tokio::test]
    async fn test_sweep_once_evicts_only_canceled() {
        let (engine, oracle, executor) = test_engine("sweep-batch", 60);
        engine.add("keep", &in_secs(600), serde_json::Value::Null).unwrap();
        engine.add("drop1", &in_secs(600), serde_json::Value::Null).unwrap();
        engine.add("drop2", &in_secs(600), serde_json::Value::Null).unwrap();
        oracle.set("keep", "approved");
        oracle.set("drop1", "canceled");
        oracle.set("drop2", "canceled");

        let evicted = sweep_once(&engine.inner).await.unwrap();
        assert_eq!(evicted, 2);
        assert!(engine.get("keep").is_some());
        assert!(engine.get("drop1").is_none());
        assert!(engine.get("drop2").is_none());
        assert!(executor.executed().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_once_empty_set_is_quiet() {
        let (engine, _oracle, _executor) = test_engine("sweep-empty", 60);
        assert_eq!(sweep_once(&engine.inner).await.unwrap(), 0);
    }

    // Sample scenario 3: a change canceled externally after scheduling is
    // evicted by the first sweep that observes it, well before its due time.
    #[tokio::test]
    async fn test_sweep_loop_evicts_canceled_change() {
        let (engine, oracle, executor) = test_engine("sweep-loop", 2);
        engine.add("C", &in_secs(30), serde_json::Value::Null).unwrap();
        engine.start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        oracle.set("C", "canceled");

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(engine.get("C").is_none());
        assert!(executor.executed().is_empty());
        engine.stop().await;
    }

    // Eviction idempotence: an explicit cancel racing the sweep leaves one
    // winner; the second removal is a no-op.
    #[tokio::test]
    async fn test_sweep_after_explicit_cancel_is_noop() {
        let (engine, oracle, _executor) = test_engine("sweep-noop", 60);
        engine.add("X", &in_secs(600), serde_json::Value::Null).unwrap();
        oracle.set("X", "canceled");

        assert!(engine.remove("X"));
        assert_eq!(sweep_once(&engine.inner).await.unwrap(), 0);
        assert!(!engine.remove("X"));
    }

    // An oracle outage leaves every change scheduled (fail-open).
    #[tokio::test]
    async fn test_sweep_fails_open_on_oracle_error() {
        let (engine, oracle, _executor) = test_engine("sweep-fail-open", 2);
        oracle.fail_all();
        engine.add("G", &in_secs(600), serde_json::Value::Null).unwrap();
        engine.start();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(engine.get("G").is_some());
        engine.stop().await;
    }
}
