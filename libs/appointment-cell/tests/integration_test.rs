use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::models::{SchedulingRules, UserSummary};
use appointment_cell::router::{appointment_routes, doctor_routes, prescription_routes};
use appointment_cell::state::AppointmentState;
use appointment_cell::store::MemoryRecordStore;
use shared_models::auth::Role;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct TestApp {
    config: TestConfig,
    store: MemoryRecordStore,
    appointments: Router,
    prescriptions: Router,
    doctors: Router,
}

impl TestApp {
    fn new() -> Self {
        let config = TestConfig::default();
        let store = MemoryRecordStore::new();
        let state = Arc::new(AppointmentState::new(
            Arc::new(store.clone()),
            SchedulingRules::default(),
            16,
        ));

        Self {
            appointments: appointment_routes(config.to_arc(), state.clone()),
            prescriptions: prescription_routes(config.to_arc(), state.clone()),
            doctors: doctor_routes(config.to_arc(), state),
            store,
            config,
        }
    }

    fn token(&self, user: &TestUser) -> String {
        JwtTestUtils::create_test_token(user, &self.config.jwt_secret, Some(1))
    }

    async fn call(router: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        Self::send(router, request).await
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn book(&self, patient: &TestUser, doctor: &TestUser, time: &str) -> (StatusCode, Value) {
        let token = self.token(patient);
        Self::call(
            &self.appointments,
            Method::POST,
            "/",
            Some(&token),
            Some(json!({
                "patient_id": patient.id,
                "doctor_id": doctor.id,
                "date": "2024-06-15",
                "time": time
            })),
        )
        .await
    }
}

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let app = TestApp::new();

    let (status, body) = TestApp::call(&app.appointments, Method::GET, "/?date=2024-06-15", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("Missing authorization header"));
}

#[tokio::test]
async fn expired_and_forged_tokens_are_rejected() {
    let app = TestApp::new();
    let patient = TestUser::patient("p1@example.com");

    for token in [
        JwtTestUtils::create_expired_token(&patient, &app.config.jwt_secret),
        JwtTestUtils::create_invalid_signature_token(&patient),
        JwtTestUtils::create_malformed_token(),
    ] {
        let (status, _) = TestApp::call(&app.appointments, Method::GET, "/?date=2024-06-15", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn unknown_role_claim_is_rejected() {
    let app = TestApp::new();
    let nurse = TestUser::with_raw_role("nurse@example.com", "nurse");
    let token = app.token(&nurse);

    let (status, _) = TestApp::call(&app.appointments, Method::GET, "/?date=2024-06-15", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn booking_flow_maps_errors_to_status_codes() {
    let app = TestApp::new();
    let p1 = TestUser::patient("p1@example.com");
    let p2 = TestUser::patient("p2@example.com");
    let d1 = TestUser::doctor("d1@example.com");

    let (status, body) = app.book(&p1, &d1, "10:00").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["appointment"]["status"], "Pending");
    let appointment_id = body["appointment"]["id"].as_str().unwrap().to_string();

    let (status, _) = app.book(&p2, &d1, "10:00").await;
    assert_eq!(status, StatusCode::CONFLICT);

    // p1 booking on p2's behalf
    let token = app.token(&p1);
    let (status, _) = TestApp::call(
        &app.appointments,
        Method::POST,
        "/",
        Some(&token),
        Some(json!({ "patient_id": p2.id, "doctor_id": d1.id, "date": "2024-06-15", "time": "11:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let doctor_token = app.token(&d1);
    let (status, body) = TestApp::call(
        &app.appointments,
        Method::PUT,
        &format!("/{}/status", appointment_id),
        Some(&doctor_token),
        Some(json!({ "status": "Confirmed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "Confirmed");

    let (status, _) = TestApp::call(
        &app.appointments,
        Method::PUT,
        &format!("/{}/status", appointment_id),
        Some(&doctor_token),
        Some(json!({ "status": "Archived" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = TestApp::call(
        &app.appointments,
        Method::PUT,
        &format!("/{}/status", Uuid::new_v4()),
        Some(&doctor_token),
        Some(json!({ "status": "Confirmed" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn capacity_breach_is_unprocessable() {
    let app = TestApp::new();
    let patient = TestUser::patient("p1@example.com");

    for time in ["09:00", "10:00", "11:00"] {
        let doctor = TestUser::doctor("d@example.com");
        let (status, _) = app.book(&patient, &doctor, time).await;
        assert_eq!(status, StatusCode::OK);
    }

    let doctor = TestUser::doctor("d4@example.com");
    let (status, body) = app.book(&patient, &doctor, "12:00").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("more than 3"));
}

#[tokio::test]
async fn reschedule_cancel_and_listing_over_http() {
    let app = TestApp::new();
    let patient = TestUser::patient("p1@example.com");
    let doctor = TestUser::doctor("d1@example.com");
    let stranger = TestUser::patient("p9@example.com");

    let (_, body) = app.book(&patient, &doctor, "10:00").await;
    let appointment_id = body["appointment"]["id"].as_str().unwrap().to_string();
    let patient_token = app.token(&patient);

    let (status, body) = TestApp::call(
        &app.appointments,
        Method::PATCH,
        &format!("/{}/reschedule", appointment_id),
        Some(&patient_token),
        Some(json!({ "new_time": "15:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["time"], "15:00");
    assert_eq!(body["appointment"]["status"], "Pending");

    let stranger_token = app.token(&stranger);
    let (status, _) = TestApp::call(
        &app.appointments,
        Method::POST,
        &format!("/{}/cancel", appointment_id),
        Some(&stranger_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let doctor_token = app.token(&doctor);
    let (status, body) = TestApp::call(
        &app.appointments,
        Method::POST,
        &format!("/{}/cancel", appointment_id),
        Some(&doctor_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "Cancelled");

    let (status, body) = TestApp::call(
        &app.appointments,
        Method::GET,
        "/?date=2024-06-15",
        Some(&doctor_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, body) = TestApp::call(
        &app.appointments,
        Method::GET,
        &format!("/{}", appointment_id),
        Some(&patient_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], appointment_id.as_str());
}

#[tokio::test]
async fn prescriptions_over_http() {
    let app = TestApp::new();
    let patient = TestUser::patient("p1@example.com");
    let doctor = TestUser::doctor("d1@example.com");
    let doctor_token = app.token(&doctor);
    let patient_token = app.token(&patient);

    let query = format!("/?patient_id={}&doctor_id={}", patient.id, doctor.id);
    let (status, body) = TestApp::call(&app.prescriptions, Method::GET, &query, Some(&patient_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["prescription"].is_null());

    let request = json!({
        "patient_id": patient.id,
        "doctor_id": doctor.id,
        "medicines": ["Ibuprofen 200mg"],
        "diagnosis": "Tension headache"
    });

    let (status, _) = TestApp::call(&app.prescriptions, Method::POST, "/", Some(&patient_token), Some(request.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = TestApp::call(&app.prescriptions, Method::POST, "/", Some(&doctor_token), Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prescription"]["diagnosis"], "Tension headache");

    let (status, body) = TestApp::call(&app.prescriptions, Method::GET, &query, Some(&patient_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prescription"]["medicines"][0], "Ibuprofen 200mg");
}

fn subscribe_request(appointment_id: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(format!("/{}/subscribe", appointment_id))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONNECTION, "upgrade")
        .header(header::UPGRADE, "websocket")
        .header(header::SEC_WEBSOCKET_VERSION, "13")
        .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn only_participants_may_watch_an_appointment() {
    let app = TestApp::new();
    let patient = TestUser::patient("p1@example.com");
    let doctor = TestUser::doctor("d1@example.com");
    let stranger = TestUser::patient("p9@example.com");

    let (_, body) = app.book(&patient, &doctor, "10:00").await;
    let appointment_id = body["appointment"]["id"].as_str().unwrap().to_string();

    let (status, body) = TestApp::send(&app.appointments, subscribe_request(&appointment_id, &app.token(&stranger))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());

    let missing = Uuid::new_v4().to_string();
    let (status, _) = TestApp::send(&app.appointments, subscribe_request(&missing, &app.token(&patient))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Access passes; the in-process request has no connection to upgrade.
    let (status, _) = TestApp::send(&app.appointments, subscribe_request(&appointment_id, &app.token(&doctor))).await;
    assert_eq!(status, StatusCode::UPGRADE_REQUIRED);
}

#[tokio::test]
async fn doctor_directory_over_http() {
    let app = TestApp::new();
    let patient = TestUser::patient("p1@example.com");
    for (name, specialization) in [("Dr. Banner", Some("Cardiology")), ("Dr. Adams", None)] {
        app.store
            .insert_user(UserSummary {
                id: Uuid::new_v4(),
                name: name.to_string(),
                email: "doctor@example.com".to_string(),
                role: Role::Doctor,
                specialization: specialization.map(str::to_string),
            })
            .await;
    }

    let (status, _) = TestApp::call(&app.doctors, Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = TestApp::call(&app.doctors, Method::GET, "/", Some(&app.token(&patient)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["doctors"][0]["name"], "Dr. Adams");
    assert_eq!(body["doctors"][0]["specialization"], "Not Specified");
    assert_eq!(body["doctors"][1]["specialization"], "Cardiology");

    let (status, body) = TestApp::call(&app.doctors, Method::GET, "/specializations", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["specializations"].as_array().unwrap().iter().any(|s| s["name"] == "Cardiology"));
}
