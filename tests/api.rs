use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use mediflow::{
    app::build_app,
    audit::AuditSink,
    auth::{claims::Role, password::hash_password, repo::NewUser},
    config::{AppConfig, JwtConfig},
    prescriptions::repo::MemoryPrescriptionStore,
    state::AppState,
};

fn test_config() -> Arc<AppConfig> {
    Arc::new(AppConfig {
        database_url: None,
        jwt: JwtConfig {
            secret: "integration-test-secret".into(),
            issuer: "mediflow".into(),
            audience: "mediflow-users".into(),
            ttl_minutes: 60 * 24,
        },
        seed_demo_accounts: false,
    })
}

fn test_state() -> AppState {
    AppState::in_memory(test_config())
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(v) => Body::from(v.to_string()),
        None => Body::empty(),
    };
    let request = builder.body(body).expect("request builds");

    let response = app.clone().oneshot(request).await.expect("app responds");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn register(app: &Router, name: &str, email: &str, role: &str) -> (String, String) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "name": name,
            "email": email,
            "password": "demo123",
            "role": role,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    (
        body["token"].as_str().expect("token").to_string(),
        body["user"]["id"].as_str().expect("user id").to_string(),
    )
}

fn sample_prescription(patient_email: &str) -> Value {
    json!({
        "patientName": "P1",
        "patientEmail": patient_email,
        "medication": "Paracetamol 500mg",
        "dosage": "500mg",
        "frequency": "3x/day",
        "duration": "7 days",
    })
}

async fn create_prescription(app: &Router, token: &str, patient_email: &str) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/prescriptions",
        Some(token),
        Some(sample_prescription(patient_email)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    body
}

#[tokio::test]
async fn health_is_open() {
    let app = build_app(test_state());
    let (status, body) = send(&app, Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn register_then_login_returns_same_user() {
    let app = build_app(test_state());
    let (_token, id) = register(&app, "Dr. A", "a@x.com", "doctor").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "a@x.com", "password": "demo123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].as_str().is_some());
    assert_eq!(body["user"]["id"], id.as_str());
    assert_eq!(body["user"]["role"], "doctor");
    assert!(
        body["user"].get("password_hash").is_none(),
        "password hash must never be serialized"
    );
}

#[tokio::test]
async fn register_duplicate_email_conflicts() {
    let app = build_app(test_state());
    register(&app, "Dr. A", "a@x.com", "doctor").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "name": "Impostor",
            "email": "a@x.com",
            "password": "demo123",
            "role": "patient",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn register_rejects_missing_or_invalid_fields() {
    let app = build_app(test_state());

    for payload in [
        json!({ "name": "", "email": "a@x.com", "password": "demo123", "role": "doctor" }),
        json!({ "name": "A", "email": "not-an-email", "password": "demo123", "role": "doctor" }),
        json!({ "name": "A", "email": "a@x.com", "password": "x", "role": "doctor" }),
        // Missing role entirely.
        json!({ "name": "A", "email": "a@x.com", "password": "demo123" }),
    ] {
        let (status, _) = send(&app, Method::POST, "/api/auth/register", None, Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn login_unknown_email_gets_generic_message() {
    let app = build_app(test_state());
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "ghost@x.com", "password": "demo123" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    // Same message as a wrong password; no account enumeration.
    assert_eq!(body["error"], "invalid credentials");
}

#[tokio::test]
async fn login_rejects_deactivated_account() {
    let state = test_state();
    state
        .users
        .create(NewUser {
            email: "off@x.com".into(),
            password_hash: hash_password("demo123").expect("hash"),
            name: "Switched Off".into(),
            role: Role::Doctor,
            is_active: false,
        })
        .await
        .expect("create");
    let app = build_app(state);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "off@x.com", "password": "demo123" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn profile_and_logout_require_a_valid_token() {
    let app = build_app(test_state());

    let (status, _) = send(&app, Method::GET, "/api/auth/profile", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/auth/profile",
        Some("not.a.token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (token, id) = register(&app, "Dr. A", "a@x.com", "doctor").await;
    let (status, body) = send(&app, Method::GET, "/api/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], id.as_str());
    assert_eq!(body["user"]["email"], "a@x.com");

    let (status, _) = send(&app, Method::POST, "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn doctor_creates_prescription_with_pending_status() {
    let app = build_app(test_state());
    let (token, id) = register(&app, "Dr. A", "a@x.com", "doctor").await;

    let body = create_prescription(&app, &token, "p1@x.com").await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["doctorId"], id.as_str());
    assert_eq!(body["patientName"], "P1");
    assert_eq!(body["medication"], "Paracetamol 500mg");
    assert_eq!(body["instructions"], "");
    assert!(body["expiresAt"].is_string());
}

#[tokio::test]
async fn create_with_missing_field_never_reaches_the_store() {
    let app = build_app(test_state());
    let (token, _) = register(&app, "Dr. A", "a@x.com", "doctor").await;

    let mut blank = sample_prescription("p1@x.com");
    blank["medication"] = json!("   ");
    let mut absent = sample_prescription("p1@x.com");
    absent.as_object_mut().expect("object").remove("duration");

    for payload in [blank, absent] {
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/prescriptions",
            Some(&token),
            Some(payload),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, body) = send(&app, Method::GET, "/api/prescriptions", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 0);
}

#[tokio::test]
async fn patient_cannot_prescribe() {
    let app = build_app(test_state());
    let (token, _) = register(&app, "Sophie", "sophie@x.com", "patient").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/prescriptions",
        Some(&token),
        Some(sample_prescription("p1@x.com")),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn only_owner_or_admin_may_update() {
    let app = build_app(test_state());
    let (dr_a, _) = register(&app, "Dr. A", "a@x.com", "doctor").await;
    let (dr_b, _) = register(&app, "Dr. B", "b@x.com", "doctor").await;
    let (admin, _) = register(&app, "Admin", "admin@x.com", "admin").await;

    let rx = create_prescription(&app, &dr_a, "p1@x.com").await;
    let uri = format!("/api/prescriptions/{}", rx["id"].as_str().expect("id"));

    let (status, _) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&dr_b),
        Some(json!({ "dosage": "250mg" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&admin),
        Some(json!({ "dosage": "250mg" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dosage"], "250mg");
}

#[tokio::test]
async fn list_is_filtered_by_role() {
    let app = build_app(test_state());
    let (dr_a, _) = register(&app, "Dr. A", "a@x.com", "doctor").await;
    let (dr_b, _) = register(&app, "Dr. B", "b@x.com", "doctor").await;
    let (patient, _) = register(&app, "Sophie", "sophie@x.com", "patient").await;
    let (pharmacist, _) = register(&app, "Marie", "marie@x.com", "pharmacist").await;

    create_prescription(&app, &dr_a, "sophie@x.com").await;
    create_prescription(&app, &dr_a, "other@x.com").await;
    create_prescription(&app, &dr_b, "third@x.com").await;

    let (_, body) = send(&app, Method::GET, "/api/prescriptions", Some(&dr_a), None).await;
    assert_eq!(body["pagination"]["total"], 2);

    let (_, body) = send(&app, Method::GET, "/api/prescriptions", Some(&patient), None).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["patientEmail"], "sophie@x.com");

    let (_, body) = send(
        &app,
        Method::GET,
        "/api/prescriptions",
        Some(&pharmacist),
        None,
    )
    .await;
    assert_eq!(body["pagination"]["total"], 3);

    let (status, _) = send(&app, Method::GET, "/api/prescriptions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn status_filter_and_pagination_apply() {
    let app = build_app(test_state());
    let (token, _) = register(&app, "Dr. A", "a@x.com", "doctor").await;

    for i in 0..3 {
        create_prescription(&app, &token, &format!("p{i}@x.com")).await;
    }

    let (_, body) = send(
        &app,
        Method::GET,
        "/api/prescriptions?page=2&limit=2",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["data"].as_array().expect("data").len(), 1);

    let (_, body) = send(
        &app,
        Method::GET,
        "/api/prescriptions?status=approved",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(body["pagination"]["total"], 0);
}

#[tokio::test]
async fn absurd_page_number_is_an_empty_page_not_an_error() {
    let app = build_app(test_state());
    let (token, _) = register(&app, "Dr. A", "a@x.com", "doctor").await;
    create_prescription(&app, &token, "p1@x.com").await;

    let uri = format!("/api/prescriptions?page={}&limit=100", i64::MAX);
    let (status, body) = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"].as_array().expect("data").len(), 0);
}

#[tokio::test]
async fn transitions_follow_the_workflow() {
    let app = build_app(test_state());
    let (token, _) = register(&app, "Dr. A", "a@x.com", "doctor").await;
    let rx = create_prescription(&app, &token, "p1@x.com").await;
    let uri = format!("/api/prescriptions/{}", rx["id"].as_str().expect("id"));

    // Skipping straight to delivered is not a legal edge.
    let (status, _) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&token),
        Some(json!({ "status": "delivered" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&token),
        Some(json!({ "status": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");

    let (status, _) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&token),
        Some(json!({ "status": "cancelled" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Cancelled is terminal; even non-status edits are refused.
    let (status, _) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&token),
        Some(json!({ "dosage": "250mg" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn get_visibility_matches_roles() {
    let app = build_app(test_state());
    let (dr_a, _) = register(&app, "Dr. A", "a@x.com", "doctor").await;
    let (dr_b, _) = register(&app, "Dr. B", "b@x.com", "doctor").await;
    let (sophie, _) = register(&app, "Sophie", "sophie@x.com", "patient").await;
    let (other_patient, _) = register(&app, "Paul", "paul@x.com", "patient").await;

    let rx = create_prescription(&app, &dr_a, "sophie@x.com").await;
    let uri = format!("/api/prescriptions/{}", rx["id"].as_str().expect("id"));

    let (status, _) = send(&app, Method::GET, &uri, Some(&dr_a), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::GET, &uri, Some(&dr_b), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::GET, &uri, Some(&sophie), None).await;
    assert_eq!(status, StatusCode::OK);

    // A non-matching patient cannot even learn the record exists.
    let (status, _) = send(&app, Method::GET, &uri, Some(&other_patient), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_is_owner_or_admin_only() {
    let app = build_app(test_state());
    let (dr_a, _) = register(&app, "Dr. A", "a@x.com", "doctor").await;
    let (dr_b, _) = register(&app, "Dr. B", "b@x.com", "doctor").await;

    let rx = create_prescription(&app, &dr_a, "p1@x.com").await;
    let uri = format!("/api/prescriptions/{}", rx["id"].as_str().expect("id"));

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&dr_b), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&dr_a), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::GET, &uri, Some(&dr_a), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_prescription_id_is_404() {
    let app = build_app(test_state());
    let (token, _) = register(&app, "Dr. A", "a@x.com", "doctor").await;

    let uri = format!("/api/prescriptions/{}", uuid::Uuid::new_v4());
    for method in [Method::GET, Method::DELETE] {
        let (status, _) = send(&app, method, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
    let (status, _) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&token),
        Some(json!({ "dosage": "1g" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

struct FailingSink;

#[async_trait]
impl AuditSink for FailingSink {
    async fn submit(&self, _event_type: &str, _payload: Value) -> anyhow::Result<()> {
        anyhow::bail!("ledger unreachable")
    }
}

#[tokio::test]
async fn audit_sink_failure_never_blocks_the_operation() {
    use mediflow::auth::repo::MemoryCredentialStore;

    let state = AppState::from_parts(
        test_config(),
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(MemoryPrescriptionStore::new()),
        Arc::new(FailingSink),
    );
    let app = build_app(state);

    let (token, _) = register(&app, "Dr. A", "a@x.com", "doctor").await;
    let rx = create_prescription(&app, &token, "p1@x.com").await;

    // The record made it to the store despite the sink being down.
    let uri = format!("/api/prescriptions/{}", rx["id"].as_str().expect("id"));
    let (status, _) = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
}
