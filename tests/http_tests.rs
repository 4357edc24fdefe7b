// Integration tests for the HTTP control API
//
// Requests go straight through the router with tower's oneshot, backed by a
// scripted capture source.

mod common;

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{ramp, test_config, ScriptedCapture};
use serde_json::{json, Value};
use session_recorder::{create_router, AppState, SessionController};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn app(temp_dir: &TempDir, capture: &ScriptedCapture) -> Result<Router> {
    let config = test_config(temp_dir.path(), 1, 1000, 1);
    let controller = SessionController::with_source(config, Box::new(capture.clone()))?;
    Ok(create_router(AppState::new(Arc::new(controller))))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => request.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    Ok((status, value))
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let app = app(&temp_dir, &ScriptedCapture::new())?;

    let (status, body) = send(&app, "GET", "/health", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_session_lifecycle_over_http() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let capture = ScriptedCapture::new();
    let app = app(&temp_dir, &capture)?;

    let (status, body) = send(&app, "GET", "/session", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "idle");

    let (status, body) = send(&app, "POST", "/session/start", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "recording");
    let session_id = body["session"]["id"].as_str().unwrap_or_default().to_string();
    assert!(!session_id.is_empty());

    let (status, _) = send(&app, "POST", "/session/start", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let mark = json!({ "label": "agenda" });
    let (status, body) = send(&app, "POST", "/session/mark", Some(mark)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["label"], "agenda");
    assert!(body["timestamp"].as_f64().is_some());

    capture.feed(ramp(0, 1500, 1));

    let (status, body) = send(&app, "GET", "/session", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "recording");
    assert_eq!(body["session"]["id"], session_id.as_str());
    assert_eq!(body["markers_count"], 1);

    let (status, body) = send(&app, "POST", "/session/stop", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "idle");
    let markers_path = body["markers_path"].as_str().unwrap_or_default();
    assert!(markers_path.ends_with(&format!("markers_{}.json", session_id)));
    assert_eq!(body["chunks"].as_array().map(Vec::len), Some(2));

    let (status, body) = send(&app, "POST", "/session/stop", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    Ok(())
}

#[tokio::test]
async fn test_mark_validation() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let app = app(&temp_dir, &ScriptedCapture::new())?;

    let (status, _) = send(&app, "POST", "/session/mark", Some(json!({ "label": "idle" }))).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    send(&app, "POST", "/session/start", None).await?;
    let (status, _) = send(&app, "POST", "/session/mark", Some(json!({ "label": "   " }))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    send(&app, "POST", "/session/stop", None).await?;
    Ok(())
}

#[tokio::test]
async fn test_start_with_unavailable_device() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let app = app(&temp_dir, &ScriptedCapture::unavailable())?;

    let (status, body) = send(&app, "POST", "/session/start", None).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap_or_default().contains("scripted device is busy"));

    let (_, body) = send(&app, "GET", "/session", None).await?;
    assert_eq!(body["state"], "idle");

    Ok(())
}
