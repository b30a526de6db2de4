use axum::http::StatusCode;
use diesel::prelude::*;
use serde_json::{Value, json};

use crate::{
    events::bookings::ensure_booking,
    schema::{bookings, feedback_answers, feedback_responses},
    test::{
        WithIdentity, answers, book, create_event, create_form, mint_qr_code,
        submit_feedback, test_server,
    },
};

fn rating_form() -> Value {
    json!({
        "name": "Post-course evaluation",
        "questions": [
            {
                "question": "Rate the course",
                "kind": { "rating": { "scale": 5 } },
            },
        ],
    })
}

#[tokio::test]
async fn booking_gated_event_rejects_feedback_without_booking() {
    let (server, _state) = test_server();

    let event_id =
        create_event(&server, json!({ "booking_enabled": true })).await;
    let form = create_form(&server, &event_id, rating_form()).await;
    let question_id = form["questions"][0]["id"].as_str().unwrap();

    let response = submit_feedback(
        &server,
        &event_id,
        form["id"].as_str().unwrap(),
        Some("alice"),
        answers(&[(question_id, json!(5))]),
    )
    .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body = response.json::<Value>();
    assert_eq!(body["error"]["code"], "attendance_required");
    assert_eq!(body["error"]["details"]["reason"], "no_booking");
}

#[tokio::test]
async fn both_attendance_gates_must_hold() {
    let (server, _state) = test_server();

    let event_id = create_event(
        &server,
        json!({ "booking_enabled": true, "qr_attendance_enabled": true }),
    )
    .await;
    let form = create_form(&server, &event_id, rating_form()).await;
    let question_id = form["questions"][0]["id"].as_str().unwrap();

    // A booking alone is not enough when scans are also required.
    book(&server, &event_id, "bob").await;

    let response = submit_feedback(
        &server,
        &event_id,
        form["id"].as_str().unwrap(),
        Some("bob"),
        answers(&[(question_id, json!(4))]),
    )
    .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body = response.json::<Value>();
    assert_eq!(body["error"]["details"]["reason"], "no_scan");

    // After a successful scan both gates hold and the submission lands.
    let code = mint_qr_code(&server, &event_id).await;
    let scan = server
        .post(&format!("/events/{event_id}/attendance/scan"))
        .as_user("bob")
        .json(&json!({ "code": code }))
        .await;
    scan.assert_status_ok();

    let response = submit_feedback(
        &server,
        &event_id,
        form["id"].as_str().unwrap(),
        Some("bob"),
        answers(&[(question_id, json!(4))]),
    )
    .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn duplicate_submissions_are_rejected_with_one_row_kept() {
    let (server, state) = test_server();

    let event_id = create_event(&server, json!({})).await;
    let form = create_form(&server, &event_id, rating_form()).await;
    let form_id = form["id"].as_str().unwrap();
    let question_id = form["questions"][0]["id"].as_str().unwrap();

    let first = submit_feedback(
        &server,
        &event_id,
        form_id,
        Some("carol"),
        answers(&[(question_id, json!(3))]),
    )
    .await;
    first.assert_status_ok();

    let second = submit_feedback(
        &server,
        &event_id,
        form_id,
        Some("carol"),
        answers(&[(question_id, json!(5))]),
    )
    .await;
    second.assert_status(StatusCode::CONFLICT);
    assert_eq!(second.json::<Value>()["error"]["code"], "already_submitted");

    let mut conn = state.pool.get().unwrap();
    let count: i64 = feedback_responses::table
        .filter(feedback_responses::form_id.eq(form_id))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn validation_reports_every_problem_at_once() {
    let (server, _state) = test_server();

    let event_id = create_event(&server, json!({})).await;
    let form = create_form(
        &server,
        &event_id,
        json!({
            "name": "Post-course evaluation",
            "questions": [
                {
                    "question": "Rate the course",
                    "kind": { "rating": { "scale": 5 } },
                },
                { "question": "What should we improve?", "kind": "text" },
            ],
        }),
    )
    .await;
    let rating_id = form["questions"][0]["id"].as_str().unwrap();

    // Out-of-range rating and a missing required text answer, together.
    let response = submit_feedback(
        &server,
        &event_id,
        form["id"].as_str().unwrap(),
        Some("dave"),
        answers(&[(rating_id, json!(6))]),
    )
    .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body = response.json::<Value>();
    assert_eq!(body["error"]["code"], "validation_failed");

    let problems = body["error"]["details"]["questions"].as_array().unwrap();
    assert_eq!(problems.len(), 2);
    assert!(
        problems[0]["message"]
            .as_str()
            .unwrap()
            .contains("between 1 and 5")
    );
    assert!(
        problems[1]["message"]
            .as_str()
            .unwrap()
            .contains("requires an answer")
    );
}

#[tokio::test]
async fn anonymous_forms_skip_identity_and_attendance_checks() {
    let (server, state) = test_server();

    // The event gates attendance on bookings, but the anonymous form must
    // not consult the verifier at all.
    let event_id =
        create_event(&server, json!({ "booking_enabled": true })).await;
    let form = create_form(
        &server,
        &event_id,
        json!({
            "name": "Anonymous evaluation",
            "anonymous_enabled": true,
            "questions": [
                {
                    "question": "Would you recommend this course?",
                    "kind": "yes_no",
                },
            ],
        }),
    )
    .await;
    let question_id = form["questions"][0]["id"].as_str().unwrap();

    let response = submit_feedback(
        &server,
        &event_id,
        form["id"].as_str().unwrap(),
        None,
        answers(&[(question_id, json!("YES"))]),
    )
    .await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["certificate_triggered"], false);

    let mut conn = state.pool.get().unwrap();
    let stored: Vec<Option<String>> = feedback_responses::table
        .filter(feedback_responses::event_id.eq(&event_id))
        .select(feedback_responses::user_id)
        .load(&mut conn)
        .unwrap();
    assert_eq!(stored, vec![None]);

    // Yes/no answers normalize to their canonical lowercase form.
    let stored_answers: Vec<String> = feedback_answers::table
        .select(feedback_answers::answer)
        .load(&mut conn)
        .unwrap();
    assert_eq!(stored_answers, vec!["yes".to_string()]);
}

#[tokio::test]
async fn unauthenticated_submission_to_named_form_is_rejected() {
    let (server, _state) = test_server();

    let event_id = create_event(&server, json!({})).await;
    let form = create_form(&server, &event_id, rating_form()).await;
    let question_id = form["questions"][0]["id"].as_str().unwrap();

    let response = submit_feedback(
        &server,
        &event_id,
        form["id"].as_str().unwrap(),
        None,
        answers(&[(question_id, json!(5))]),
    )
    .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn replaced_forms_stop_accepting_submissions() {
    let (server, _state) = test_server();

    let event_id = create_event(&server, json!({})).await;
    let old_form = create_form(&server, &event_id, rating_form()).await;
    let old_question = old_form["questions"][0]["id"].as_str().unwrap();

    // Creating a new form retires the old one.
    let new_form = create_form(&server, &event_id, rating_form()).await;
    let new_question = new_form["questions"][0]["id"].as_str().unwrap();

    let active = server
        .get(&format!("/events/{event_id}/feedback/form"))
        .await;
    active.assert_status_ok();
    assert_eq!(active.json::<Value>()["id"], new_form["id"]);

    let stale = submit_feedback(
        &server,
        &event_id,
        old_form["id"].as_str().unwrap(),
        Some("erin"),
        answers(&[(old_question, json!(5))]),
    )
    .await;
    stale.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(stale.json::<Value>()["error"]["code"], "form_not_found");

    let fresh = submit_feedback(
        &server,
        &event_id,
        new_form["id"].as_str().unwrap(),
        Some("erin"),
        answers(&[(new_question, json!(5))]),
    )
    .await;
    fresh.assert_status_ok();
}

#[tokio::test]
async fn reconciler_reuses_the_existing_booking() {
    let (server, state) = test_server();

    let event_id = create_event(&server, json!({})).await;

    let mut conn = state.pool.get().unwrap();

    let first = ensure_booking(&event_id, "frank", &mut conn).unwrap();
    assert!(first.checked_in);
    assert_eq!(first.status, "attended");

    // Asking again, as a racing trigger would, lands on the same row.
    let second = ensure_booking(&event_id, "frank", &mut conn).unwrap();
    assert_eq!(first.id, second.id);

    let count: i64 = bookings::table
        .filter(bookings::event_id.eq(&event_id))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(count, 1);
}
