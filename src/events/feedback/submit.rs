use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use diesel::prelude::*;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, StorageError},
    events::{
        Event,
        attendance::verify_attendance,
        bookings::ensure_booking,
        certificates::{Trigger, run_gate},
        feedback::{
            FeedbackAnswer, FeedbackForm, FeedbackResponse, validate_answers,
        },
    },
    identity::Identity,
    schema::{
        bookings, feedback_answers, feedback_forms, feedback_responses,
    },
    state::{AppState, Conn},
};

#[derive(Deserialize)]
pub struct SubmitFeedbackRequest {
    pub form_id: String,
    pub answers: IndexMap<String, Value>,
}

#[derive(Serialize)]
pub struct SubmitFeedbackView {
    pub response_id: String,
    pub certificate_triggered: bool,
}

/// Receives a feedback submission, validates it, and persists it.
///
/// Everything up to the response insert can reject the submission; once the
/// response row exists, nothing downstream (booking flag update, certificate
/// gate, issuer, notifier) is allowed to fail the request.
pub async fn submit_feedback(
    Path(event_id): Path<String>,
    identity: Option<Identity>,
    State(state): State<AppState>,
    mut conn: Conn,
    Json(req): Json<SubmitFeedbackRequest>,
) -> ApiResult<Json<SubmitFeedbackView>> {
    let event = Event::fetch(&event_id, &mut *conn)?;

    let form = feedback_forms::table
        .filter(feedback_forms::id.eq(&req.form_id))
        .first::<FeedbackForm>(&mut *conn)
        .optional()
        .map_err(StorageError::from)?
        .ok_or(ApiError::FormNotFound)?;

    if !form.active
        || form.event_id.as_deref().is_some_and(|owner| owner != event.id)
    {
        return Err(ApiError::FormNotFound);
    }

    // Anonymous forms accept unauthenticated submissions; everything else
    // needs a caller identity.
    let submitter = match (identity, form.anonymous_enabled) {
        (Some(identity), _) => Some(identity),
        (None, true) => None,
        (None, false) => return Err(ApiError::Unauthorized),
    };

    if let Some(identity) = &submitter {
        if !identity.is_staff() {
            let attendance = verify_attendance(
                &event,
                &identity.user_id,
                identity.role,
                &mut *conn,
            )?;
            if !attendance.attended {
                return Err(ApiError::AttendanceRequired(attendance.reason));
            }
        }
    }

    let questions = form.questions(&mut *conn)?;
    let validated = validate_answers(&questions, &req.answers)
        .map_err(ApiError::ValidationFailed)?;

    // Resolve the booking anchor before the insert. Failing to get one is
    // logged and tolerated: the submission itself must still be accepted.
    let booking = match &submitter {
        Some(identity) => {
            match ensure_booking(&event.id, &identity.user_id, &mut *conn) {
                Ok(booking) => Some(booking),
                Err(error) => {
                    warn!(
                        event = %event.id,
                        user = %identity.user_id,
                        %error,
                        "certificate eligibility could not be established: \
                         no booking anchor"
                    );
                    None
                }
            }
        }
        None => None,
    };

    let response = FeedbackResponse {
        id: Uuid::now_v7().to_string(),
        form_id: form.id.clone(),
        event_id: event.id.clone(),
        user_id: submitter.as_ref().map(|i| i.user_id.clone()),
        booking_id: booking.as_ref().map(|b| b.id.clone()),
        submitted_at: Utc::now().naive_utc(),
    };

    let answers: Vec<FeedbackAnswer> = validated
        .iter()
        .map(|(question_id, answer)| FeedbackAnswer {
            id: Uuid::now_v7().to_string(),
            response_id: response.id.clone(),
            question_id: question_id.clone(),
            answer: answer.canonical(),
        })
        .collect();

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::insert_into(feedback_responses::table)
            .values(&response)
            .execute(conn)?;
        for answer in &answers {
            diesel::insert_into(feedback_answers::table)
                .values(answer)
                .execute(conn)?;
        }
        Ok(())
    })
    .map_err(|error| match StorageError::from(error) {
        StorageError::Duplicate => ApiError::AlreadySubmitted,
        other => ApiError::Storage(other),
    })?;

    // Best-effort from here on.
    if let Some(booking) = &booking {
        if let Err(error) = diesel::update(bookings::table.find(&booking.id))
            .set(bookings::feedback_completed.eq(true))
            .execute(&mut *conn)
        {
            warn!(
                booking = %booking.id,
                %error,
                "failed to mark booking feedback_completed"
            );
        }
    }

    let certificate_triggered = match &submitter {
        Some(identity) => {
            run_gate(
                &event,
                &identity.user_id,
                Trigger::FeedbackSubmitted,
                state.issuer.as_ref(),
                state.notifier.as_ref(),
                &mut *conn,
            )
            .certificate_issued
        }
        None => false,
    };

    Ok(Json(SubmitFeedbackView {
        response_id: response.id,
        certificate_triggered,
    }))
}
