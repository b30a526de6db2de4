use axum::{Json, extract::State};
use chrono::{NaiveDateTime, Utc};
use diesel::{SqliteConnection, prelude::*};
use itertools::Itertools;
use serde::Serialize;
use tracing::info;

use crate::{
    error::{ApiResult, StorageError},
    events::{
        Event,
        bookings::STATUS_CANCELLED,
        certificates::{CertificateIssuer, Notifier, Trigger, run_gate},
    },
    identity::Identity,
    schema::{attendance_scans, bookings, certificates, events},
    state::{AppState, Conn},
};

#[derive(Debug, Default, Serialize)]
pub struct SweepSummary {
    pub events_swept: usize,
    pub candidates: usize,
    pub certificates_issued: usize,
}

/// The post-event sweep: once an event has ended, issue certificates to
/// every verified attendee of events that auto-issue and do not gate on
/// feedback. This is the backstop for attendees whose scan-triggered
/// issuance never fired; running it after the scan path is harmless because
/// the issuer is idempotent.
pub fn run_post_event_sweep(
    now: NaiveDateTime,
    issuer: &dyn CertificateIssuer,
    notifier: &dyn Notifier,
    conn: &mut SqliteConnection,
) -> Result<SweepSummary, StorageError> {
    let mut summary = SweepSummary::default();

    let ended: Vec<Event> = events::table
        .filter(events::ends_at.le(now))
        .filter(events::auto_generate_certificate.eq(true))
        .filter(events::feedback_required_for_certificate.eq(false))
        .order_by(events::ends_at.asc())
        .load::<Event>(conn)
        .map_err(StorageError::from)?;

    for event in ended {
        summary.events_swept += 1;

        for user_id in certificate_candidates(&event, conn)? {
            summary.candidates += 1;

            let report = run_gate(
                &event,
                &user_id,
                Trigger::PostEventSweep,
                issuer,
                notifier,
                conn,
            );
            if report.certificate_issued {
                summary.certificates_issued += 1;
            }
        }
    }

    info!(
        events = summary.events_swept,
        candidates = summary.candidates,
        issued = summary.certificates_issued,
        "post-event sweep finished"
    );

    Ok(summary)
}

/// Users who might still be owed a certificate: everyone holding a live
/// booking or a successful scan, minus those already issued.
fn certificate_candidates(
    event: &Event,
    conn: &mut SqliteConnection,
) -> Result<Vec<String>, StorageError> {
    let booked: Vec<Option<String>> = bookings::table
        .filter(bookings::event_id.eq(&event.id))
        .filter(bookings::status.ne(STATUS_CANCELLED))
        .select(bookings::user_id)
        .load(conn)
        .map_err(StorageError::from)?;

    let scanned: Vec<String> = attendance_scans::table
        .filter(attendance_scans::event_id.eq(&event.id))
        .filter(attendance_scans::scan_success.eq(true))
        .select(attendance_scans::user_id)
        .load(conn)
        .map_err(StorageError::from)?;

    let issued: Vec<String> = certificates::table
        .filter(certificates::event_id.eq(&event.id))
        .select(certificates::user_id)
        .load(conn)
        .map_err(StorageError::from)?;

    Ok(booked
        .into_iter()
        .flatten()
        .chain(scanned)
        .filter(|user_id| !issued.contains(user_id))
        .unique()
        .sorted()
        .collect())
}

/// Immediate sweep, for operators.
pub async fn run_sweep_now(
    identity: Identity,
    State(state): State<AppState>,
    mut conn: Conn,
) -> ApiResult<Json<SweepSummary>> {
    identity.require_staff()?;

    let summary = run_post_event_sweep(
        Utc::now().naive_utc(),
        state.issuer.as_ref(),
        state.notifier.as_ref(),
        &mut *conn,
    )?;

    Ok(Json(summary))
}
