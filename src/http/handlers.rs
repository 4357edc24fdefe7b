use super::state::AppState;
use crate::audio::{list_input_devices, InputDeviceInfo};
use crate::error::RecorderError;
use crate::session::{Marker, Session, SessionState};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartRecordingResponse {
    pub session: Session,
    pub status: SessionState,
    /// Abnormal stream status seen while opening, if any
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarkRequest {
    pub label: String,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub status: SessionState,
    pub markers_path: String,
    pub chunks: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Input devices to pick from when the device could not be opened
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<InputDeviceInfo>,
}

fn error_response(err: RecorderError) -> Response {
    let status = match &err {
        RecorderError::AlreadyRecording | RecorderError::NoActiveSession => StatusCode::CONFLICT,
        RecorderError::DeviceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        RecorderError::Configuration(_) => StatusCode::BAD_REQUEST,
        RecorderError::IoFailure { .. } | RecorderError::MarkerPersistence { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    if status.is_server_error() {
        error!("Request failed: {}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            devices: err.candidates().to_vec(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
/// Start a new recording session
pub async fn start_recording(State(state): State<AppState>) -> Response {
    match state.controller.start().await {
        Ok(session) => {
            info!("Recording started via HTTP: {}", session.id);
            let warning = state.controller.take_warning().await;
            (
                StatusCode::OK,
                Json(StartRecordingResponse {
                    session,
                    status: state.controller.state(),
                    warning,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /session/mark
/// Drop a marker in the active session
pub async fn add_marker(
    State(state): State<AppState>,
    Json(req): Json<MarkRequest>,
) -> Response {
    let label = req.label.trim();
    if label.is_empty() {
        return error_response(RecorderError::Configuration(
            "marker label must not be empty".to_string(),
        ));
    }

    match state.controller.mark(label).await {
        Ok(marker) => (StatusCode::OK, Json::<Marker>(marker)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /session/stop
/// Stop the active session
pub async fn stop_recording(State(state): State<AppState>) -> Response {
    match state.controller.stop_with_chunks().await {
        Ok((markers_path, chunks)) => {
            let chunks = chunks
                .iter()
                .map(|c| c.path.display().to_string())
                .collect();

            (
                StatusCode::OK,
                Json(StopRecordingResponse {
                    status: state.controller.state(),
                    markers_path: markers_path.display().to_string(),
                    chunks,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// GET /session
/// Get status of the controller
pub async fn get_session_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.controller.stats().await))
}

/// GET /devices
/// Enumerate input devices
pub async fn list_devices() -> Response {
    match tokio::task::spawn_blocking(list_input_devices).await {
        Ok(devices) => (StatusCode::OK, Json(devices)).into_response(),
        Err(e) => {
            error!("Device enumeration failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Device enumeration failed: {}", e),
                    devices: Vec::new(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
