use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use dispatch_core::{DispatchService, EventLog, Responder, Role, SqliteStore};
use dispatch_server::config::Paging;
use dispatch_server::{app, AppState};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::util::ServiceExt; // for `oneshot`

const OPERATOR: (&str, &str) = ("op-1", "Call Operator");
const ADMIN: (&str, &str) = ("admin-1", "Admin");
const OFFICER: (&str, &str) = ("eo-1", "Emergency Officer");

fn test_app(name: &str) -> Router {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let path = PathBuf::from("/tmp/wildlife-dispatch-tests").join(format!("api-{name}-{nanos}.db"));
    let store = SqliteStore::open(&path).expect("open store");
    for (id, role) in [
        ("eo-1", Role::EmergencyOfficer),
        ("eo-2", Role::EmergencyOfficer),
        ("vet-1", Role::Veterinarian),
    ] {
        store
            .upsert_responder(&Responder {
                id: id.into(),
                name: id.into(),
                role,
                active: true,
                deleted: false,
            })
            .expect("seed responder");
    }
    let log = EventLog::open(&path).expect("open log");
    app(AppState {
        service: DispatchService::new(Arc::new(store), log),
        paging: Paging::default(),
    })
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    caller: Option<(&str, &str)>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some((id, role)) = caller {
        builder = builder.header("x-user-id", id).header("x-user-role", role);
    }
    let request = builder
        .body(match body {
            Some(b) => Body::from(serde_json::to_vec(&b).unwrap()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn visitor_report(incident_type: &str) -> Value {
    json!({
        "type": incident_type,
        "description": "Visitor fell near the overlook",
        "location": "Trail 3",
        "date": "2024-05-01",
        "time": "10:00"
    })
}

async fn report(app: &Router, incident_type: &str) -> String {
    let (status, body) = send(app, Method::POST, "/emergencies/report", None, Some(visitor_report(incident_type))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_endpoint_works() {
    let app = test_app("health");
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn guest_report_is_public() {
    let app = test_app("guest");
    let (status, body) = send(&app, Method::POST, "/emergencies/report", None, Some(visitor_report("Human"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "Reported");
    assert_eq!(body["data"]["category"], "Medical Emergency");
    assert_eq!(body["data"]["priority"], "Medium");
}

#[tokio::test]
async fn guest_report_lists_every_missing_field() {
    let app = test_app("guest-invalid");
    let (status, body) = send(&app, Method::POST, "/emergencies/report", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "ValidationError");
    assert_eq!(body["errors"].as_array().map(Vec::len), Some(5));

    let (status, body) = send(&app, Method::POST, "/emergencies/report", None, Some(visitor_report("Meteor"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidIncidentType");
}

#[tokio::test]
async fn protected_routes_need_caller_context() {
    let app = test_app("unauthenticated");
    let (status, body) = send(&app, Method::GET, "/emergencies", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = send(&app, Method::GET, "/emergencies", Some(("vet-1", "Veterinarian")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn officer_resolves_assigned_incident() {
    let app = test_app("scenario");
    let id = report(&app, "Human").await;

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/emergencies/{id}/assign"),
        Some(OPERATOR),
        Some(json!({"userId": "eo-1", "userModel": "EmergencyOfficer"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "Assigned");
    assert_eq!(body["data"]["assignment"]["assignedRole"], "Emergency Officer");

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/emergencies/{id}/assign"),
        Some(OPERATOR),
        Some(json!({"userId": "vet-1", "userModel": "Vet"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ResponderNotEligible");

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/emergencies/{id}/status-simple"),
        Some(("eo-2", "Emergency Officer")),
        Some(json!({"status": "InProgress"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    for target in ["InProgress", "Resolved"] {
        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/emergencies/{id}/status-simple"),
            Some(OFFICER),
            Some(json!({ "status": target })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["status"], target);
    }

    let (status, body) = send(&app, Method::GET, "/emergencies/assigned", Some(OFFICER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let (status, body) = send(&app, Method::GET, &format!("/emergencies/{id}/timeline"), Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    let kinds = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["eventType"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec!["Reported", "Assigned", "StatusChanged", "StatusChanged", "StatusChanged"]
    );
}

#[tokio::test]
async fn illegal_transition_is_rejected() {
    let app = test_app("illegal");
    let id = report(&app, "Equipment").await;
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/emergencies/{id}/status"),
        Some(ADMIN),
        Some(json!({"status": "Closed"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "IllegalTransition");

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/emergencies/{id}/status"),
        Some(ADMIN),
        Some(json!({"status": "Finished"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidStatus");
}

#[tokio::test]
async fn list_is_filtered_and_paginated() {
    let app = test_app("list");
    for incident_type in ["Human", "Animal", "Animal"] {
        report(&app, incident_type).await;
    }

    let (status, body) = send(&app, Method::GET, "/emergencies?limit=2", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["pagination"], json!({"current": 1, "pages": 2, "total": 3}));

    let (status, body) = send(&app, Method::GET, "/emergencies?type=Animal&page=1", Some(OFFICER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 2);
    assert!(body["data"]
        .as_array()
        .unwrap()
        .iter()
        .all(|i| i["type"] == "Animal"));

    let (status, body) = send(&app, Method::GET, "/emergencies?sort=name", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");
}

#[tokio::test]
async fn operator_report_and_delete() {
    let app = test_app("operator");
    let (status, body) = send(
        &app,
        Method::POST,
        "/emergencies/call-operator",
        Some(OPERATOR),
        Some(json!({
            "type": "Animal",
            "description": "Injured deer on the road",
            "location": "North gate",
            "date": "2024-05-01",
            "time": "06:15",
            "reporterName": "Sam",
            "assignedOfficer": "vet-1",
            "forwardedTo": "Vet",
            "isDirectCall": true
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["status"], "Assigned");
    assert_eq!(body["data"]["reportMethod"], "Phone");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, Method::DELETE, &format!("/emergencies/{id}"), Some(("op-2", "Call Operator")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::DELETE, &format!("/emergencies/{id}"), Some(OPERATOR), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = send(&app, Method::GET, &format!("/emergencies/{id}"), Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "IncidentNotFound");
}

#[tokio::test]
async fn stats_reflect_todays_reports() {
    let app = test_app("stats");
    report(&app, "Human").await;
    report(&app, "NaturalDisaster").await;

    let (status, body) = send(&app, Method::GET, "/emergencies/stats?period=today", Some(OFFICER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["byType"]["NaturalDisaster"], 1);
    assert_eq!(body["data"]["byStatus"]["Closed"], 0);

    let (status, _) = send(&app, Method::GET, "/emergencies/stats?period=year", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn private_notes_are_redacted_for_responders() {
    let app = test_app("notes");
    let id = report(&app, "Human").await;
    send(
        &app,
        Method::PUT,
        &format!("/emergencies/{id}/assign"),
        Some(OPERATOR),
        Some(json!({"userId": "eo-1", "userModel": "EmergencyOfficer"})),
    )
    .await;
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/emergencies/{id}/notes"),
        Some(OPERATOR),
        Some(json!({"note": "repeat caller", "isPrivate": true})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, desk) = send(&app, Method::GET, &format!("/emergencies/{id}"), Some(OPERATOR), None).await;
    assert_eq!(desk["data"]["adminNotes"].as_array().map(Vec::len), Some(1));
    let (_, field) = send(&app, Method::GET, &format!("/emergencies/{id}"), Some(OFFICER), None).await;
    assert_eq!(field["data"]["adminNotes"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn report_schema_is_published() {
    let app = test_app("schema");
    let (status, body) = send(&app, Method::GET, "/emergencies/report/schema", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["report.v1"].is_object());
    assert!(body["data"]["operator-report.v1"].is_object());
}
