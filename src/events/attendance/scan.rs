use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::{ApiResult, StorageError},
    events::{
        Event,
        attendance::{AttendanceScan, QrCode},
        bookings::{STATUS_ATTENDED, ensure_booking},
        certificates::{Trigger, run_gate},
    },
    identity::Identity,
    schema::{attendance_qr_codes, attendance_scans, bookings},
    state::{AppState, Conn},
};

#[derive(Deserialize)]
pub struct ScanRequest {
    pub code: String,
}

#[derive(Serialize)]
pub struct ScanView {
    pub scan_success: bool,
    pub certificate_triggered: bool,
}

/// Records a QR scan attempt. A successful scan checks the attendee in and
/// immediately re-evaluates the certificate gate, so that certificates for
/// scan-gated events arrive without waiting for the post-event sweep.
pub async fn record_scan(
    Path(event_id): Path<String>,
    identity: Identity,
    State(state): State<AppState>,
    mut conn: Conn,
    Json(req): Json<ScanRequest>,
) -> ApiResult<Json<ScanView>> {
    let event = Event::fetch(&event_id, &mut *conn)?;

    let qr_code = attendance_qr_codes::table
        .filter(attendance_qr_codes::event_id.eq(&event.id))
        .filter(attendance_qr_codes::code.eq(&req.code))
        .filter(attendance_qr_codes::active.eq(true))
        .first::<QrCode>(&mut *conn)
        .optional()
        .map_err(StorageError::from)?;

    // Every attempt is recorded; only successful ones count anywhere.
    let scan = AttendanceScan {
        id: Uuid::now_v7().to_string(),
        qr_code_id: qr_code.as_ref().map(|c| c.id.clone()),
        event_id: event.id.clone(),
        user_id: identity.user_id.clone(),
        scan_success: qr_code.is_some(),
        scanned_at: Utc::now().naive_utc(),
    };

    diesel::insert_into(attendance_scans::table)
        .values(&scan)
        .execute(&mut *conn)
        .map_err(StorageError::from)?;

    if !scan.scan_success {
        return Ok(Json(ScanView {
            scan_success: false,
            certificate_triggered: false,
        }));
    }

    // A successful scan is attendance: anchor it on a booking and check in.
    // Losing the anchor must not fail the scan itself.
    match ensure_booking(&event.id, &identity.user_id, &mut *conn) {
        Ok(booking) => {
            if !booking.checked_in || booking.status != STATUS_ATTENDED {
                if let Err(error) = diesel::update(
                    bookings::table.find(&booking.id),
                )
                .set((
                    bookings::checked_in.eq(true),
                    bookings::status.eq(STATUS_ATTENDED),
                ))
                .execute(&mut *conn)
                {
                    warn!(
                        event = %event.id,
                        user = %identity.user_id,
                        %error,
                        "failed to mark booking checked in after scan"
                    );
                }
            }
        }
        Err(error) => {
            warn!(
                event = %event.id,
                user = %identity.user_id,
                %error,
                "certificate eligibility could not be established after scan"
            );
        }
    }

    let report = run_gate(
        &event,
        &identity.user_id,
        Trigger::QrScan,
        state.issuer.as_ref(),
        state.notifier.as_ref(),
        &mut *conn,
    );

    Ok(Json(ScanView {
        scan_success: true,
        certificate_triggered: report.certificate_issued,
    }))
}
