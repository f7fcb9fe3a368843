//! Scheduler engine — the pending-set facade and the due-time dispatch loop.
//!
//! The dispatch loop polls in bounded 1-second quanta so a stop signal and
//! newly inserted earlier-due changes are both observed within one quantum.
//! A due change is re-checked against the status oracle at the last second,
//! retired from the pending set under the lock, and only then handed to the
//! executor on a detached task — at most one dispatch per task instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use changeflow_core::config::SchedulerConfig;
use changeflow_core::time::format_datetime;
use changeflow_core::Result;

use crate::executor::ChangeExecutor;
use crate::oracle::{reports_canceled, StatusOracle};
use crate::queue::PendingSet;
use crate::store::TaskStore;
use crate::sweep;
use crate::task::ChangeTask;

/// Poll quantum for the dispatch loop and the sweep loop's stop checks.
pub(crate) const POLL_QUANTUM: Duration = Duration::from_secs(1);

/// How long `stop()` waits for each loop before abandoning it.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Shared engine state — the one exclusion domain plus the collaborators.
pub(crate) struct EngineInner {
    pub(crate) pending: Mutex<PendingSet>,
    pub(crate) store: Arc<TaskStore>,
    pub(crate) oracle: Arc<dyn StatusOracle>,
    pub(crate) executor: Arc<dyn ChangeExecutor>,
    pub(crate) sweep_interval: Duration,
    pub(crate) running: AtomicBool,
}

impl EngineInner {
    /// Snapshot the pending set to disk on a detached blocking task.
    /// Callers never wait on durability.
    pub(crate) fn snapshot(&self) {
        let tasks = self.pending.lock().unwrap().all();
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = store.save(&tasks) {
                tracing::warn!("⚠️ Snapshot write failed: {e}");
            }
        });
    }
}

/// Engine introspection for health reporting.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub running: bool,
    pub task_count: usize,
    pub next_change: Option<NextChange>,
}

/// The earliest pending change.
#[derive(Debug, Clone)]
pub struct NextChange {
    pub change_number: String,
    pub implementation_time: DateTime<Utc>,
}

/// The scheduling engine — owns the pending set and both background loops.
pub struct SchedulerEngine {
    pub(crate) inner: Arc<EngineInner>,
    loops: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl SchedulerEngine {
    /// Create a new engine. Call [`restore`](Self::restore) to reload the
    /// last snapshot, then [`start`](Self::start) to spin up the loops.
    pub fn new(
        config: &SchedulerConfig,
        store: TaskStore,
        oracle: Arc<dyn StatusOracle>,
        executor: Arc<dyn ChangeExecutor>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                pending: Mutex::new(PendingSet::new()),
                store: Arc::new(store),
                oracle,
                executor,
                sweep_interval: Duration::from_secs(config.status_check_interval_secs),
                running: AtomicBool::new(false),
            }),
            loops: Mutex::new(Vec::new()),
        }
    }

    /// Rebuild the pending set from the last on-disk snapshot.
    pub fn restore(&self) {
        let tasks = self.inner.store.load();
        if tasks.is_empty() {
            return;
        }
        let mut pending = self.inner.pending.lock().unwrap();
        let count = tasks.len();
        for task in tasks {
            pending.insert(task);
        }
        tracing::info!("📦 Restored {count} scheduled change(s) from snapshot");
    }

    /// Schedule a change, overwriting any pending schedule for the same
    /// change number (the reschedule path).
    ///
    /// The only synchronous failure is a malformed implementation time; the
    /// snapshot write and the initial status probe are detached. The probe
    /// is informational — it never retires the task.
    pub fn add(
        &self,
        change_number: &str,
        implementation_time: &str,
        metadata: serde_json::Value,
    ) -> Result<ChangeTask> {
        let due = changeflow_core::time::parse_datetime(implementation_time)?;
        let task = ChangeTask::new(change_number, due, metadata);
        {
            let mut pending = self.inner.pending.lock().unwrap();
            if let Some(old) = pending.insert(task.clone()) {
                tracing::info!(
                    "Rescheduling change {change_number} from {} to {}",
                    format_datetime(old.implementation_time),
                    format_datetime(due)
                );
            }
        }
        self.inner.snapshot();
        self.spawn_status_probe(change_number);
        tracing::info!(
            "📅 Scheduled change {change_number} for {}",
            format_datetime(due)
        );
        Ok(task)
    }

    /// Explicitly cancel a scheduled change. Returns whether it was pending.
    pub fn remove(&self, change_number: &str) -> bool {
        let removed = self
            .inner
            .pending
            .lock()
            .unwrap()
            .remove(change_number)
            .is_some();
        if removed {
            self.inner.snapshot();
            tracing::info!("Removed change {change_number} from schedule");
        }
        removed
    }

    pub fn get(&self, change_number: &str) -> Option<ChangeTask> {
        self.inner.pending.lock().unwrap().get(change_number).cloned()
    }

    pub fn list(&self) -> Vec<ChangeTask> {
        self.inner.pending.lock().unwrap().all()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> EngineStats {
        let pending = self.inner.pending.lock().unwrap();
        EngineStats {
            running: self.is_running(),
            task_count: pending.len(),
            next_change: pending.next_due().map(|t| NextChange {
                change_number: t.change_number.clone(),
                implementation_time: t.implementation_time,
            }),
        }
    }

    /// Seconds between status sweeps, for health reporting.
    pub fn sweep_interval(&self) -> Duration {
        self.inner.sweep_interval
    }

    /// Direct status probe, for the force-check endpoint.
    pub async fn check_status(
        &self,
        change_number: &str,
    ) -> std::result::Result<Option<String>, String> {
        self.inner.oracle.check(change_number).await
    }

    /// Start the dispatch and sweep loops. Idempotent.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut loops = self.loops.lock().unwrap();
        loops.push(tokio::spawn(run_dispatch_loop(self.inner.clone())));
        loops.push(tokio::spawn(sweep::run_sweep_loop(self.inner.clone())));
        tracing::info!("⏰ Scheduler engine started");
    }

    /// Signal both loops to exit and join each with a bounded wait.
    /// A loop that fails to exit in time is abandoned. Idempotent.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let handles: Vec<_> = self.loops.lock().unwrap().drain(..).collect();
        for handle in handles {
            if tokio::time::timeout(STOP_GRACE, handle).await.is_err() {
                tracing::warn!(
                    "⚠️ Loop did not stop within {}s; abandoning it",
                    STOP_GRACE.as_secs()
                );
            }
        }
        tracing::info!("Scheduler engine stopped");
    }

    /// Informational status probe after a schedule/reschedule; logged only.
    fn spawn_status_probe(&self, change_number: &str) {
        let inner = self.inner.clone();
        let change_number = change_number.to_string();
        tokio::spawn(async move {
            match inner.oracle.check(&change_number).await {
                Ok(Some(status)) => {
                    tracing::info!("Change {change_number} status: {status}");
                }
                Ok(None) => tracing::info!("Change {change_number} status: unknown"),
                Err(e) => {
                    tracing::warn!("⚠️ Status probe for change {change_number} failed: {e}");
                }
            }
        });
    }
}

/// One decision per poll cycle, computed entirely under the lock.
enum Step {
    /// Nothing due: sleep (bounded by the poll quantum) and re-peek.
    Sleep(Duration),
    /// Stale queue head discarded; re-check immediately.
    Skip,
    /// A live due change, already reconciled against the pending set.
    Fire(ChangeTask),
}

pub(crate) async fn run_dispatch_loop(inner: Arc<EngineInner>) {
    tracing::info!("⏰ Dispatch loop started");
    while inner.running.load(Ordering::SeqCst) {
        match next_step(&inner) {
            Step::Sleep(wait) => tokio::time::sleep(wait).await,
            Step::Skip => {}
            Step::Fire(task) => fire_due_change(&inner, task).await,
        }
    }
    tracing::info!("Dispatch loop stopped");
}

fn next_step(inner: &EngineInner) -> Step {
    let mut pending = inner.pending.lock().unwrap();
    let now = Utc::now();
    let head = pending.peek_next().map(|(due, _)| due);
    match head {
        None => Step::Sleep(POLL_QUANTUM),
        Some(due) if due > now => {
            let until_due = (due - now).to_std().unwrap_or_default();
            Step::Sleep(until_due.min(POLL_QUANTUM))
        }
        Some(_) => match pending.pop_next() {
            Some((due, change_number)) => match pending.get(&change_number) {
                // Only an entry matching the live task's due time is
                // current; anything else was removed or rescheduled.
                Some(task) if task.implementation_time == due => Step::Fire(task.clone()),
                _ => Step::Skip,
            },
            None => Step::Sleep(POLL_QUANTUM),
        },
    }
}

/// Last-second cancellation check, then retire-and-dispatch.
///
/// The oracle is consulted outside the lock. Whichever of dispatch, sweep,
/// or explicit cancel removes the task first wins; the losers see a missing
/// or rescheduled entry and back off.
async fn fire_due_change(inner: &EngineInner, task: ChangeTask) {
    let change_number = task.change_number.clone();
    let outcome = inner.oracle.check(&change_number).await;
    if let Err(e) = &outcome {
        tracing::warn!("⚠️ Status check for change {change_number} failed: {e}");
    }

    if reports_canceled(&outcome) {
        tracing::info!("Skipping execution of change {change_number} as it was canceled");
        let removed = {
            let mut pending = inner.pending.lock().unwrap();
            let still_current = pending
                .get(&change_number)
                .is_some_and(|t| t.implementation_time == task.implementation_time);
            still_current && pending.remove(&change_number).is_some()
        };
        if removed {
            inner.snapshot();
        }
        return;
    }

    // Fail-open: any other status, an unknown status, or an oracle failure
    // leaves the change valid. Retire it before dispatch so it cannot fire
    // twice, but only if it was not rescheduled while the oracle ran.
    let retired = {
        let mut pending = inner.pending.lock().unwrap();
        let still_current = pending
            .get(&change_number)
            .is_some_and(|t| t.implementation_time == task.implementation_time);
        if still_current {
            pending.remove(&change_number)
        } else {
            None
        }
    };
    let Some(task) = retired else {
        return;
    };
    inner.snapshot();

    tracing::info!(
        "🔔 Executing change {change_number} scheduled for {}",
        format_datetime(task.implementation_time)
    );
    let executor = inner.executor.clone();
    tokio::spawn(async move {
        match executor.execute(&task).await {
            Ok(code) => tracing::info!(
                "✅ Change {} execution completed with status code {code}",
                task.change_number
            ),
            Err(e) => {
                tracing::warn!("⚠️ Execution failed for change {}: {e}", task.change_number);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{in_secs, test_engine, RecordingExecutor, ScriptedOracle};

    #[tokio::test]
    async fn test_add_and_list() {
        let (engine, _oracle, _executor) = test_engine("add-list", 60);
        engine
            .add("CHG123456", &in_secs(3600), serde_json::Value::Null)
            .unwrap();

        assert_eq!(engine.list().len(), 1);
        let task = engine.get("CHG123456").unwrap();
        assert_eq!(task.change_number, "CHG123456");
    }

    #[tokio::test]
    async fn test_add_rejects_malformed_time() {
        let (engine, _oracle, _executor) = test_engine("bad-time", 60);
        let err = engine.add("CHG1", "tomorrow-ish", serde_json::Value::Null);
        assert!(err.is_err());
        assert!(engine.list().is_empty());
    }

    #[tokio::test]
    async fn test_reschedule_overwrites_in_place() {
        let (engine, _oracle, _executor) = test_engine("resched", 60);
        engine.add("CHG1", &in_secs(100), serde_json::Value::Null).unwrap();
        let new_time = in_secs(7200);
        engine.add("CHG1", &new_time, serde_json::Value::Null).unwrap();

        assert_eq!(engine.list().len(), 1);
        let task = engine.get("CHG1").unwrap();
        assert_eq!(format_datetime(task.implementation_time), new_time);
    }

    #[tokio::test]
    async fn test_remove_twice_is_noop() {
        let (engine, _oracle, _executor) = test_engine("remove-twice", 60);
        engine.add("CHG1", &in_secs(100), serde_json::Value::Null).unwrap();

        assert!(engine.remove("CHG1"));
        assert!(!engine.remove("CHG1"));
        assert!(engine.get("CHG1").is_none());
    }

    #[tokio::test]
    async fn test_stats_reports_earliest_change() {
        let (engine, _oracle, _executor) = test_engine("stats", 60);
        engine.add("later", &in_secs(500), serde_json::Value::Null).unwrap();
        engine.add("sooner", &in_secs(50), serde_json::Value::Null).unwrap();

        let stats = engine.stats();
        assert!(!stats.running);
        assert_eq!(stats.task_count, 2);
        assert_eq!(stats.next_change.unwrap().change_number, "sooner");
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let (engine, _oracle, _executor) = test_engine("lifecycle", 60);
        engine.start();
        engine.start();
        assert!(engine.is_running());
        assert_eq!(engine.loops.lock().unwrap().len(), 2);

        engine.stop().await;
        engine.stop().await;
        assert!(!engine.is_running());
        assert!(engine.loops.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_rebuilds_pending_set() {
        let (engine, _oracle, _executor) = test_engine("restore", 60);
        engine.add("CHG1", &in_secs(600), serde_json::Value::Null).unwrap();
        // Snapshots are detached writes; give each one room to land so the
        // later superset is the one on disk.
        tokio::time::sleep(Duration::from_millis(200)).await;
        engine.add("CHG2", &in_secs(1200), serde_json::Value::Null).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let fresh = SchedulerEngine::new(
            &crate::testing::test_config(60),
            TaskStore::new(&crate::testing::store_dir("restore")),
            Arc::new(ScriptedOracle::new()),
            Arc::new(RecordingExecutor::new()),
        );
        fresh.restore();
        assert_eq!(fresh.list().len(), 2);
        assert_eq!(fresh.stats().next_change.unwrap().change_number, "CHG1");
    }

    // Sample scenario 1: a change due in two seconds fires once the time
    // arrives and leaves the schedule empty.
    #[tokio::test]
    async fn test_due_change_dispatches_on_time() {
        let (engine, oracle, executor) = test_engine("dispatch", 60);
        oracle.set("A", "approved");
        engine.add("A", &in_secs(2), serde_json::Value::Null).unwrap();
        engine.start();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(executor.executed(), vec!["A"]);
        assert!(engine.get("A").is_none());
        assert!(engine.list().is_empty());
        engine.stop().await;
    }

    // Sample scenario 2: an explicit cancel before the due time suppresses
    // execution entirely.
    #[tokio::test]
    async fn test_removed_change_never_executes() {
        let (engine, _oracle, executor) = test_engine("cancel-early", 60);
        engine.add("B", &in_secs(5), serde_json::Value::Null).unwrap();
        engine.start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(engine.remove("B"));
        assert!(engine.get("B").is_none());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(executor.executed().is_empty());
        engine.stop().await;
    }

    // Sample scenario 4: a change already past due fires on the very first
    // poll cycle.
    #[tokio::test]
    async fn test_past_due_change_fires_immediately() {
        let (engine, _oracle, executor) = test_engine("past-due", 60);
        engine.add("D", &in_secs(-1), serde_json::Value::Null).unwrap();
        engine.start();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(executor.executed(), vec!["D"]);
        engine.stop().await;
    }

    // Cancellation precedence: a change the oracle reports canceled at the
    // due instant is evicted without execution.
    #[tokio::test]
    async fn test_canceled_change_is_skipped_at_due_time() {
        let (engine, oracle, executor) = test_engine("canceled-at-due", 60);
        oracle.set("E", "canceled");
        engine.add("E", &in_secs(1), serde_json::Value::Null).unwrap();
        engine.start();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(executor.executed().is_empty());
        assert!(engine.get("E").is_none());
        engine.stop().await;
    }

    // An oracle outage must not drop work: dispatch proceeds fail-open.
    #[tokio::test]
    async fn test_oracle_failure_fails_open_on_dispatch() {
        let (engine, oracle, executor) = test_engine("oracle-down", 60);
        oracle.fail_all();
        engine.add("F", &in_secs(1), serde_json::Value::Null).unwrap();
        engine.start();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(executor.executed(), vec!["F"]);
        engine.stop().await;
    }

    // Reschedule overwrite: the stale queue entry for the old time must not
    // trigger an early or duplicate execution.
    #[tokio::test]
    async fn test_reschedule_fires_once_at_new_time() {
        let (engine, _oracle, executor) = test_engine("resched-fire", 60);
        engine.add("R", &in_secs(1), serde_json::Value::Null).unwrap();
        let new_time = in_secs(3);
        let new_due = changeflow_core::time::parse_datetime(&new_time).unwrap();
        engine.add("R", &new_time, serde_json::Value::Null).unwrap();
        engine.start();

        tokio::time::sleep(Duration::from_secs(5)).await;
        let fired = executor.executed_at();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, "R");
        // The stale entry for the original time must not trigger an early
        // dispatch; the single execution happens at or after the new time.
        assert!(fired[0].1 >= new_due);
        engine.stop().await;
    }

    // Due-order property: distinct due times dispatch in non-decreasing
    // order.
    #[tokio::test]
    async fn test_dispatch_order_follows_due_times() {
        let (engine, _oracle, executor) = test_engine("due-order", 60);
        engine.add("third", &in_secs(3), serde_json::Value::Null).unwrap();
        engine.add("first", &in_secs(1), serde_json::Value::Null).unwrap();
        engine.add("second", &in_secs(2), serde_json::Value::Null).unwrap();
        engine.start();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(executor.executed(), vec!["first", "second", "third"]);
        engine.stop().await;
    }
}
