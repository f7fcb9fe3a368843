//! API routes for scheduling, canceling, and inspecting changes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use changeflow_core::time::{format_datetime, is_future};
use changeflow_engine::ChangeTask;

use crate::server::AppState;

/// Request body for `POST /schedule`.
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub change_number: String,
    pub implementation_time: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn schedule_response(task: &ChangeTask) -> serde_json::Value {
    serde_json::json!({
        "change_number": task.change_number,
        "status": "scheduled",
        "implementation_time": format_datetime(task.implementation_time),
    })
}

/// Schedule a new change (or reschedule a pending one).
pub async fn schedule_change(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScheduleRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    match is_future(&req.implementation_time) {
        Ok(true) => {}
        Ok(false) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({
                    "ok": false,
                    "error": "Implementation time must be in the future"
                })),
            );
        }
        Err(e) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({"ok": false, "error": e.to_string()})),
            );
        }
    }

    match state
        .engine
        .add(&req.change_number, &req.implementation_time, req.metadata)
    {
        Ok(task) => {
            let mut body = schedule_response(&task);
            body["ok"] = true.into();
            (StatusCode::CREATED, Json(body))
        }
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({"ok": false, "error": e.to_string()})),
        ),
    }
}

/// Get a scheduled change.
pub async fn get_scheduled_change(
    State(state): State<Arc<AppState>>,
    Path(change_number): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.engine.get(&change_number) {
        Some(task) => {
            let mut body = schedule_response(&task);
            body["ok"] = true.into();
            (StatusCode::OK, Json(body))
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "ok": false,
                "error": format!("Change {change_number} not found in schedule")
            })),
        ),
    }
}

/// Cancel a scheduled change.
pub async fn cancel_scheduled_change(
    State(state): State<Arc<AppState>>,
    Path(change_number): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    if state.engine.remove(&change_number) {
        (StatusCode::OK, Json(serde_json::json!({"ok": true})))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "ok": false,
                "error": format!("Change {change_number} not found in schedule")
            })),
        )
    }
}

/// List all scheduled changes.
pub async fn list_scheduled_changes(
    State(state): State<Arc<AppState>>,
) -> Json<serde_json::Value> {
    let changes: Vec<_> = state.engine.list().iter().map(schedule_response).collect();
    Json(serde_json::json!({
        "ok": true,
        "changes": changes,
        "count": changes.len(),
    }))
}

/// Service health and scheduler introspection.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stats = state.engine.stats();
    let next_task = stats.next_change.map(|next| {
        serde_json::json!({
            "change_number": next.change_number,
            "implementation_time": format_datetime(next.implementation_time),
        })
    });

    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "current_time": format_datetime(chrono::Utc::now()),
        "tasks_count": stats.task_count,
        "scheduler_running": stats.running,
        "next_task": next_task,
        "status_check_interval": format!("{} seconds", state.engine.sweep_interval().as_secs()),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Force a status check for a pending change. Informational only — the
/// engine's own loops decide whether anything is retired.
pub async fn force_check_status(
    State(state): State<Arc<AppState>>,
    Path(change_number): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    if state.engine.get(&change_number).is_none() {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "ok": false,
                "error": format!("Change {change_number} not found in schedule")
            })),
        );
    }

    let current_status = match state.engine.check_status(&change_number).await {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!("⚠️ Forced status check for change {change_number} failed: {e}");
            None
        }
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "ok": true,
            "change_number": change_number,
            "current_status": current_status,
        })),
    )
}
