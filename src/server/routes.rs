// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use super::AppState;
use crate::core::timestamp_now;

const DEFAULT_LOG_LIMIT: usize = 50;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/stats", get(stats))
        .route("/logs", get(logs))
        .route("/logs/summary", get(summary))
        .route("/control/camera/{camera_id}/{action}", post(control_camera))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LOG_LIMIT
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraAction {
    Start,
    Stop,
    Restart,
}

impl CameraAction {
    pub fn as_str(self) -> &'static str {
        match self {
            CameraAction::Start => "start",
            CameraAction::Stop => "stop",
            CameraAction::Restart => "restart",
        }
    }
}

impl FromStr for CameraAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(CameraAction::Start),
            "stop" => Ok(CameraAction::Stop),
            "restart" => Ok(CameraAction::Restart),
            _ => Err(()),
        }
    }
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "operational",
        "service": "Safety Monitoring System",
        "timestamp": timestamp_now(),
        "connected_clients": state.broadcast.connected_clients(),
    }))
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "connected_clients": state.broadcast.connected_clients(),
        "camera_worker_active": state.camera.is_running(),
        "audio_worker_active": state.audio.is_running(),
        "timestamp": timestamp_now(),
    }))
}

async fn logs(State(state): State<AppState>, Query(query): Query<LogsQuery>) -> Json<Value> {
    let logger = state.logger.clone();
    let records = match tokio::task::spawn_blocking(move || logger.get_recent(query.limit)).await {
        Ok(Ok(records)) => records,
        Ok(Err(e)) => {
            error!("Failed to read recent logs: {}", e);
            Vec::new()
        }
        Err(e) => {
            error!("Log query task failed: {}", e);
            Vec::new()
        }
    };

    Json(json!({
        "total": records.len(),
        "logs": records,
    }))
}

async fn summary(State(state): State<AppState>) -> Json<Value> {
    let logger = state.logger.clone();
    let result = tokio::task::spawn_blocking(move || logger.get_summary()).await;

    let failure = match result {
        Ok(Ok(summary)) => match serde_json::to_value(summary) {
            Ok(value) => return Json(value),
            Err(e) => e.to_string(),
        },
        Ok(Err(e)) => e.to_string(),
        Err(e) => e.to_string(),
    };

    error!("Failed to build log summary: {}", failure);
    Json(json!({
        "error": failure,
        "timestamp": timestamp_now(),
    }))
}

async fn control_camera(Path((camera_id, action)): Path<(String, String)>) -> Response {
    let Ok(action) = action.parse::<CameraAction>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid action. Use: start, stop, or restart" })),
        )
            .into_response();
    };

    info!("Camera control requested: {} {}", camera_id, action.as_str());
    Json(json!({
        "camera_id": camera_id,
        "action": action.as_str(),
        "status": "executed",
        "timestamp": timestamp_now(),
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Event;
    use crate::db::{CsvStore, DurableLogger, FlushPolicy, SqliteStore};
    use crate::sensors::WorkerControl;
    use crate::streaming::broadcast_control;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    fn state() -> (TempDir, AppState) {
        let dir = tempdir().unwrap();
        let primary = SqliteStore::new(dir.path().join("events.db"));
        primary.init().unwrap();
        let fallback = CsvStore::new(dir.path().join("logs"));
        let logger = Arc::new(
            DurableLogger::new(Arc::new(primary), Box::new(fallback), FlushPolicy::default())
                .unwrap(),
        );
        let (broadcast, _control) = broadcast_control();
        let state = AppState {
            logger,
            broadcast,
            camera: Arc::new(WorkerControl::new()),
            audio: Arc::new(WorkerControl::new()),
        };
        (dir, state)
    }

    async fn call(state: AppState, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = crate::server::app(state)
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_root_reports_operational() {
        let (_dir, state) = state();
        let (status, body) = call(state, "GET", "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "operational");
        assert_eq!(body["service"], "Safety Monitoring System");
        assert_eq!(body["connected_clients"], 0);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_stats_reports_idle_workers() {
        let (_dir, state) = state();
        let (status, body) = call(state, "GET", "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["camera_worker_active"], false);
        assert_eq!(body["audio_worker_active"], false);
    }

    #[tokio::test]
    async fn test_logs_respects_limit() {
        let (_dir, state) = state();
        for i in 0..4 {
            state
                .logger
                .log_event(Event::noise_level(80.0 + f64::from(i), 85.0))
                .unwrap();
        }
        state.logger.close().unwrap();

        let (status, body) = call(state.clone(), "GET", "/logs?limit=3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);
        assert_eq!(body["logs"].as_array().unwrap().len(), 3);

        let (_, body) = call(state, "GET", "/logs").await;
        assert_eq!(body["total"], 4);
        assert_eq!(body["logs"][0]["event_type"], "noise_level");
    }

    #[tokio::test]
    async fn test_summary_counts_by_source() {
        let (_dir, state) = state();
        state.logger.log_event(Event::noise_level(90.0, 85.0)).unwrap();
        state
            .logger
            .log_event(Event::people_detection(1, true, Some("fall_detected".into()), 10.0))
            .unwrap();
        state.logger.close().unwrap();

        let (status, body) = call(state, "GET", "/logs/summary").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_events"], 2);
        assert_eq!(body["by_source"]["audio"], 1);
        assert_eq!(body["recent_accidents"], 1);
    }

    #[tokio::test]
    async fn test_camera_control_actions() {
        let (_dir, state) = state();

        let (status, body) = call(state.clone(), "POST", "/control/camera/cam0/bogus").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid action. Use: start, stop, or restart");

        let (status, body) = call(state.clone(), "POST", "/control/camera/cam0/stop").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["camera_id"], "cam0");
        assert_eq!(body["action"], "stop");
        assert_eq!(body["status"], "executed");
        assert!(!state.camera.is_running());
    }
}
