//! End-to-end tests that drive the HTTP surface against an in-memory
//! database, the same router and extractors as production.

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestRequest, TestResponse, TestServer};
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::MigrationHarness;
use serde_json::{Value, json};

use crate::{
    MIGRATIONS,
    config::create_app,
    events::certificates::{DbCertificateIssuer, TableNotifier},
    state::{AppState, DbPool},
};

mod feedback_pipeline;

pub fn test_state() -> AppState {
    let pool: DbPool = Pool::builder()
        .max_size(1)
        .build(ConnectionManager::<diesel::SqliteConnection>::new(":memory:"))
        .unwrap();

    {
        let mut conn = pool.get().unwrap();
        conn.run_pending_migrations(MIGRATIONS).unwrap();
    }

    AppState {
        pool,
        issuer: Arc::new(DbCertificateIssuer),
        notifier: Arc::new(TableNotifier),
    }
}

pub fn test_server() -> (TestServer, AppState) {
    let state = test_state();
    let server = TestServer::new(create_app(state.clone())).unwrap();
    (server, state)
}

pub trait WithIdentity {
    fn as_user(self, user_id: &str) -> Self;
    fn as_staff(self, user_id: &str) -> Self;
}

impl WithIdentity for TestRequest {
    fn as_user(self, user_id: &str) -> Self {
        self.add_header(
            HeaderName::from_static("x-user-id"),
            HeaderValue::from_str(user_id).unwrap(),
        )
    }

    fn as_staff(self, user_id: &str) -> Self {
        self.as_user(user_id).add_header(
            HeaderName::from_static("x-user-role"),
            HeaderValue::from_static("staff"),
        )
    }
}

/// Creates an event with sane defaults (already ended, so the sweep will
/// consider it) and whatever flag overrides the test needs.
pub async fn create_event(server: &TestServer, overrides: Value) -> String {
    let mut body = json!({
        "name": "Advanced Cardiac Life Support",
        "venue": "Lecture theatre 2",
        "starts_at": "2020-01-10T09:00:00",
        "ends_at": "2020-01-10T17:00:00",
    });
    for (key, value) in overrides.as_object().unwrap() {
        body[key.as_str()] = value.clone();
    }

    let response = server
        .post("/events")
        .as_staff("coordinator")
        .json(&body)
        .await;
    response.assert_status_ok();
    response.json::<Value>()["id"].as_str().unwrap().to_string()
}

pub async fn create_form(
    server: &TestServer,
    event_id: &str,
    body: Value,
) -> Value {
    let response = server
        .post(&format!("/events/{event_id}/feedback/forms"))
        .as_staff("coordinator")
        .json(&body)
        .await;
    response.assert_status_ok();
    response.json::<Value>()
}

pub async fn book(server: &TestServer, event_id: &str, user: &str) {
    let response = server
        .post(&format!("/events/{event_id}/bookings"))
        .as_user(user)
        .await;
    response.assert_status_ok();
}

pub async fn mint_qr_code(server: &TestServer, event_id: &str) -> String {
    let response = server
        .post(&format!("/events/{event_id}/qr-codes"))
        .as_staff("coordinator")
        .await;
    response.assert_status_ok();
    response.json::<Value>()["code"].as_str().unwrap().to_string()
}

pub async fn submit_feedback(
    server: &TestServer,
    event_id: &str,
    form_id: &str,
    user: Option<&str>,
    answers: Value,
) -> TestResponse {
    let mut request = server
        .post(&format!("/events/{event_id}/feedback/submit"))
        .json(&json!({ "form_id": form_id, "answers": answers }));
    if let Some(user) = user {
        request = request.as_user(user);
    }
    request.await
}

pub fn answers(pairs: &[(&str, Value)]) -> Value {
    Value::Object(
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect(),
    )
}

pub async fn issued_certificates(
    server: &TestServer,
    event_id: &str,
) -> Vec<Value> {
    let response = server
        .get(&format!("/events/{event_id}/certificates"))
        .as_staff("coordinator")
        .await;
    response.assert_status_ok();
    response.json::<Vec<Value>>()
}
