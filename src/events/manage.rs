use axum::{Json, extract::Path};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, StorageError},
    events::Event,
    identity::Identity,
    schema::events,
    state::Conn,
};

#[derive(Deserialize)]
pub struct CreateEventRequest {
    pub name: String,
    #[serde(default)]
    pub venue: Option<String>,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    #[serde(default)]
    pub booking_enabled: bool,
    #[serde(default)]
    pub qr_attendance_enabled: bool,
    #[serde(default)]
    pub auto_generate_certificate: bool,
    #[serde(default)]
    pub certificate_template_id: Option<String>,
    #[serde(default)]
    pub certificate_auto_send_email: bool,
    #[serde(default)]
    pub feedback_required_for_certificate: bool,
}

pub async fn create_event(
    identity: Identity,
    mut conn: Conn,
    Json(req): Json<CreateEventRequest>,
) -> ApiResult<Json<Event>> {
    identity.require_staff()?;

    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("event name must not be empty".into()));
    }
    if req.ends_at <= req.starts_at {
        return Err(ApiError::BadRequest(
            "event must end after it starts".into(),
        ));
    }

    let event = Event {
        id: Uuid::now_v7().to_string(),
        name: req.name,
        venue: req.venue,
        starts_at: req.starts_at,
        ends_at: req.ends_at,
        booking_enabled: req.booking_enabled,
        qr_attendance_enabled: req.qr_attendance_enabled,
        auto_generate_certificate: req.auto_generate_certificate,
        certificate_template_id: req.certificate_template_id,
        certificate_auto_send_email: req.certificate_auto_send_email,
        feedback_required_for_certificate: req
            .feedback_required_for_certificate,
        created_at: Utc::now().naive_utc(),
    };

    diesel::insert_into(events::table)
        .values(&event)
        .execute(&mut *conn)
        .map_err(StorageError::from)?;

    Ok(Json(event))
}

pub async fn view_event(
    Path(event_id): Path<String>,
    mut conn: Conn,
) -> ApiResult<Json<Event>> {
    Ok(Json(Event::fetch(&event_id, &mut *conn)?))
}
