//! Integration tests for the REST API
//!
//! Drives the full HTTP surface end-to-end: value writes, conflict
//! detection, the cache, resolution, and the downstream gate.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use crosscheck_api::{create_router, create_router_with_config};
use crosscheck_detector::DetectorConfig;
use crosscheck_engine::EngineConfig;
use serde_json::{json, Value};
use tower::Service;
use uuid::Uuid;

/// Helper function to send a request using a router
async fn send_request_with_app(
    app: &mut Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request_builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");

    let request = if let Some(body_json) = body {
        request_builder
            .body(Body::from(serde_json::to_string(&body_json).unwrap()))
            .unwrap()
    } else {
        request_builder.body(Body::empty()).unwrap()
    };

    let response = app.call(request).await.unwrap();
    let status = response.status();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap_or(json!({}));

    (status, json)
}

/// Helper for stateless tests
async fn send_request(method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut app = create_router();
    send_request_with_app(&mut app, method, uri, body).await
}

fn save_body(field: &str, kind: &str, raw: &str, source: &str) -> Value {
    json!({
        "field_name": field,
        "value": { "kind": kind, "raw": raw },
        "source": source,
        "actor": "test"
    })
}

/// Seeds two disagreeing revenue values, returns (app, record_id)
async fn app_with_mismatch() -> (Router, String) {
    let mut app = create_router();
    let record_id = Uuid::new_v4().to_string();

    let mut extracted = save_body("annual_revenue", "numeric", "5,000,000", "automated_extraction");
    extracted["confidence"] = json!(0.85);
    let (status, _) = send_request_with_app(
        &mut app,
        "POST",
        &format!("/records/{record_id}/values"),
        Some(extracted),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send_request_with_app(
        &mut app,
        "POST",
        &format!("/records/{record_id}/values"),
        Some(save_body("annual_revenue", "numeric", "8200000", "structured_form")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    (app, record_id)
}

#[tokio::test]
async fn test_health_check() {
    let (status, body) = send_request("GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "Crosscheck Conflict Review");
}

#[tokio::test]
async fn test_save_and_list_values() {
    let mut app = create_router();
    let record_id = Uuid::new_v4().to_string();

    let (status, body) = send_request_with_app(
        &mut app,
        "POST",
        &format!("/records/{record_id}/values"),
        Some(save_body("company_name", "text", "Acme Corp", "manual_edit")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let value_id = body["id"].as_str().expect("Expected value ID");
    assert!(!value_id.is_empty());

    let (status, body) = send_request_with_app(
        &mut app,
        "GET",
        &format!("/records/{record_id}/values"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], value_id);
    assert_eq!(rows[0]["field_name"], "company_name");
    assert_eq!(rows[0]["source"], "manual_edit");
    assert_eq!(rows[0]["active"], true);
}

#[tokio::test]
async fn test_invalid_confidence_rejected() {
    let mut app = create_router();
    let record_id = Uuid::new_v4().to_string();

    let mut body = save_body("company_name", "text", "Acme", "automated_extraction");
    body["confidence"] = json!(1.5);

    let (status, err) = send_request_with_app(
        &mut app,
        "POST",
        &format!("/records/{record_id}/values"),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["error"].as_str().unwrap().contains("confidence"));
}

#[tokio::test]
async fn test_invalid_record_id() {
    let (status, _) = send_request("GET", "/records/not-a-uuid/conflicts", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mismatch_detected_and_served() {
    let (mut app, record_id) = app_with_mismatch().await;

    let (status, body) = send_request_with_app(
        &mut app,
        "GET",
        &format!("/records/{record_id}/conflicts"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let conflicts = body.as_array().unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0]["kind"], "value_mismatch");
    assert_eq!(conflicts[0]["field_name"], "annual_revenue");
    assert_eq!(conflicts[0]["priority"], "high");
    assert_eq!(conflicts[0]["status"], "pending");
    assert_eq!(conflicts[0]["value_ids"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_gate_blocks_on_high_priority() {
    let (mut app, record_id) = app_with_mismatch().await;

    let (status, body) =
        send_request_with_app(&mut app, "GET", &format!("/records/{record_id}/gate"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["blocking"], true);
    assert_eq!(body["pending"], 1);
    assert_eq!(body["high"], 1);
}

#[tokio::test]
async fn test_resolve_flow() {
    let (mut app, record_id) = app_with_mismatch().await;

    let (_, conflicts) = send_request_with_app(
        &mut app,
        "GET",
        &format!("/records/{record_id}/conflicts"),
        None,
    )
    .await;
    let conflict = &conflicts.as_array().unwrap()[0];
    let conflict_id = conflict["id"].as_str().unwrap().to_string();
    let winner = conflict["value_ids"].as_array().unwrap()[1]
        .as_str()
        .unwrap()
        .to_string();

    let (status, body) = send_request_with_app(
        &mut app,
        "POST",
        &format!("/conflicts/{conflict_id}/resolve"),
        Some(json!({
            "winning_value_ids": [winner],
            "notes": "verified against filing",
            "actor": "alice"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");
    assert_eq!(body["reviewed_by"], "alice");

    // The loser is now inactive; unqualified reads return active values only.
    let (_, values) = send_request_with_app(
        &mut app,
        "GET",
        &format!("/records/{record_id}/values"),
        None,
    )
    .await;
    let active = values.as_array().unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["id"], winner.as_str());

    // The full history stays readable for audit.
    let (_, values) = send_request_with_app(
        &mut app,
        "GET",
        &format!("/records/{record_id}/values?active_only=false"),
        None,
    )
    .await;
    assert_eq!(values.as_array().unwrap().len(), 2);

    // And the gate clears.
    let (_, gate) =
        send_request_with_app(&mut app, "GET", &format!("/records/{record_id}/gate"), None).await;
    assert_eq!(gate["blocking"], false);
}

#[tokio::test]
async fn test_double_resolve_conflicts() {
    let (mut app, record_id) = app_with_mismatch().await;

    let (_, conflicts) = send_request_with_app(
        &mut app,
        "GET",
        &format!("/records/{record_id}/conflicts"),
        None,
    )
    .await;
    let conflict = &conflicts.as_array().unwrap()[0];
    let conflict_id = conflict["id"].as_str().unwrap().to_string();
    let winner = conflict["value_ids"].as_array().unwrap()[0]
        .as_str()
        .unwrap()
        .to_string();

    let request = json!({
        "winning_value_ids": [winner],
        "actor": "alice"
    });

    let (status, _) = send_request_with_app(
        &mut app,
        "POST",
        &format!("/conflicts/{conflict_id}/resolve"),
        Some(request.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_request_with_app(
        &mut app,
        "POST",
        &format!("/conflicts/{conflict_id}/resolve"),
        Some(request),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_defer_conflict() {
    let (mut app, record_id) = app_with_mismatch().await;

    let (_, conflicts) = send_request_with_app(
        &mut app,
        "GET",
        &format!("/records/{record_id}/conflicts"),
        None,
    )
    .await;
    let conflict_id = conflicts.as_array().unwrap()[0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, body) = send_request_with_app(
        &mut app,
        "POST",
        &format!("/conflicts/{conflict_id}/defer"),
        Some(json!({ "notes": "waiting on the filing", "actor": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "deferred");

    let (_, gate) =
        send_request_with_app(&mut app, "GET", &format!("/records/{record_id}/gate"), None).await;
    assert_eq!(gate["pending"], 0);
    assert_eq!(gate["deferred"], 1);
    assert_eq!(gate["blocking"], false);
}

#[tokio::test]
async fn test_reject_conflict() {
    let (mut app, record_id) = app_with_mismatch().await;

    let (_, conflicts) = send_request_with_app(
        &mut app,
        "GET",
        &format!("/records/{record_id}/conflicts"),
        None,
    )
    .await;
    let conflict_id = conflicts.as_array().unwrap()[0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, body) = send_request_with_app(
        &mut app,
        "POST",
        &format!("/conflicts/{conflict_id}/reject"),
        Some(json!({ "notes": "both forms agree, extraction noise", "actor": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
}

#[tokio::test]
async fn test_missing_required_via_gate() {
    let config = EngineConfig::default().with_detector(
        DetectorConfig::default().with_required_fields(vec!["effective_date".to_string()]),
    );
    let mut app = create_router_with_config(config);
    let record_id = Uuid::new_v4().to_string();

    // No writes at all: the gate still reports the missing field.
    let (status, gate) =
        send_request_with_app(&mut app, "GET", &format!("/records/{record_id}/gate"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(gate["blocking"], true);
    assert_eq!(gate["high"], 1);

    send_request_with_app(
        &mut app,
        "POST",
        &format!("/records/{record_id}/values"),
        Some(save_body("effective_date", "date", "2024-01-01", "manual_edit")),
    )
    .await;

    let (_, gate) =
        send_request_with_app(&mut app, "GET", &format!("/records/{record_id}/gate"), None).await;
    assert_eq!(gate["blocking"], false);
}

#[tokio::test]
async fn test_force_refresh() {
    let (mut app, record_id) = app_with_mismatch().await;

    let (status, body) = send_request_with_app(
        &mut app,
        "POST",
        &format!("/records/{record_id}/conflicts/refresh"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_conflict_id() {
    let conflict_id = Uuid::new_v4();
    let (status, _) = send_request(
        "POST",
        &format!("/conflicts/{conflict_id}/resolve"),
        Some(json!({ "winning_value_ids": [], "actor": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_system_stats() {
    let (mut app, record_id) = app_with_mismatch().await;
    send_request_with_app(&mut app, "GET", &format!("/records/{record_id}/conflicts"), None).await;

    let (status, body) = send_request_with_app(&mut app, "GET", "/system/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_values"], 2);
    assert_eq!(body["active_values"], 2);
    assert_eq!(body["total_conflicts"], 1);
    assert_eq!(body["pending_conflicts"], 1);
    assert!(body["detection_passes"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_trigger_mode_roundtrip() {
    let mut app = create_router();

    let (status, body) = send_request_with_app(&mut app, "GET", "/system/trigger-mode", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "immediate");

    let (status, body) = send_request_with_app(
        &mut app,
        "PUT",
        "/system/trigger-mode",
        Some(json!({ "mode": "deferred" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "deferred");

    // Unknown names fall back to immediate rather than erroring.
    let (status, body) = send_request_with_app(
        &mut app,
        "PUT",
        "/system/trigger-mode",
        Some(json!({ "mode": "eventually" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "immediate");
}
