//! API route definitions.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use super::ApiError;
use crate::logs::{filter_by_category, Category};
use crate::scheduler::RunOutcome;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/alerts", get(list_alerts).delete(clear_alerts))
        .route("/alerts/read-all", post(mark_all_read))
        .route("/alerts/{id}", delete(dismiss_alert))
        .route("/alerts/{id}/read", post(mark_read))
        .route("/scheduler", get(scheduler_status))
        .route("/scheduler/toggle", post(toggle_scheduler))
        .route("/scheduler/refresh", post(refresh_now))
        .route("/logs", get(list_logs))
        .route("/logs/stats", get(log_stats))
        .route("/status", get(status))
        .route("/rules", get(list_rules))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn list_alerts(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.alerts.lock().await.snapshot();
    Json(json!({
        "data": snapshot,
        "meta": { "total": snapshot.alerts.len(), "unread": snapshot.unread_count }
    }))
}

async fn clear_alerts(State(state): State<AppState>) -> Json<Value> {
    state.alerts.lock().await.clear_all();
    Json(json!({ "data": { "cleared": true } }))
}

async fn mark_all_read(State(state): State<AppState>) -> Json<Value> {
    let mut alerts = state.alerts.lock().await;
    alerts.mark_all_read();
    Json(json!({ "data": { "unread": alerts.unread_count() } }))
}

async fn mark_read(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    let mut alerts = state.alerts.lock().await;
    let updated = alerts.mark_read(&id);
    Json(json!({ "data": { "id": id, "updated": updated, "unread": alerts.unread_count() } }))
}

async fn dismiss_alert(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    let dismissed = state.alerts.lock().await.dismiss(&id);
    Json(json!({ "data": { "id": id, "dismissed": dismissed } }))
}

async fn scheduler_status(State(state): State<AppState>) -> Json<Value> {
    let status = state.scheduler.status();
    Json(json!({ "data": status, "meta": { "display": status.display() } }))
}

async fn toggle_scheduler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let active = state.scheduler.toggle().await?;
    Ok(Json(json!({ "data": { "is_active": active } })))
}

async fn refresh_now(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.scheduler.reset_and_run_now().await? {
        RunOutcome::Completed(run) => Ok(Json(json!({ "data": run }))),
        RunOutcome::AlreadyRefreshing => {
            Err(ApiError::Conflict("a refresh is already in progress".to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    category: Option<String>,
}

async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Value>, ApiError> {
    let category = match query.category.as_deref() {
        None => Category::All,
        Some(raw) => raw.parse::<Category>().map_err(ApiError::BadRequest)?,
    };
    let batch = state.batch.read().await;
    let entries = filter_by_category(&batch.entries, category);
    Ok(Json(json!({
        "data": entries,
        "meta": { "total": entries.len(), "batch_size": batch.entries.len() }
    })))
}

async fn log_stats(State(state): State<AppState>) -> Json<Value> {
    let batch = state.batch.read().await;
    let stats = &batch.status.stats;
    Json(json!({
        "data": stats,
        "meta": {
            "percent": {
                "normal": stats.percent(stats.normal),
                "warnings": stats.percent(stats.warnings),
                "alerts": stats.percent(stats.alerts),
                "unclassifiable": stats.percent(stats.unclassifiable)
            }
        }
    }))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    let batch = state.batch.read().await.status.clone();
    let unread = state.alerts.lock().await.unread_count();
    let scheduler = state.scheduler.status();
    Json(json!({
        "data": {
            "batch": batch,
            "unread_alerts": unread,
            "scheduler": scheduler
        }
    }))
}

async fn list_rules(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": *state.rules, "meta": { "total": state.rules.len() } }))
}
