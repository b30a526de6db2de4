use std::fmt;

use axum::{Json, extract::Path};
use chrono::{NaiveDateTime, Utc};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use rand::{Rng, distr::Alphanumeric};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{ApiResult, StorageError},
    events::{Event, bookings::Booking},
    identity::{Identity, Role},
    schema::{attendance_qr_codes, attendance_scans},
    state::Conn,
};

pub mod scan;

#[derive(
    Queryable, Selectable, Identifiable, Insertable, Debug, Clone, Serialize,
)]
#[diesel(table_name = attendance_qr_codes)]
pub struct QrCode {
    pub id: String,
    pub event_id: String,
    pub code: String,
    pub label: Option<String>,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(
    Queryable, Selectable, Identifiable, Insertable, Debug, Clone, Serialize,
)]
#[diesel(table_name = attendance_scans)]
pub struct AttendanceScan {
    pub id: String,
    pub qr_code_id: Option<String>,
    pub event_id: String,
    pub user_id: String,
    pub scan_success: bool,
    pub scanned_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceReason {
    Ok,
    NoBooking,
    NoScan,
}

impl AttendanceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceReason::Ok => "ok",
            AttendanceReason::NoBooking => "no_booking",
            AttendanceReason::NoScan => "no_scan",
        }
    }
}

impl fmt::Display for AttendanceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AttendanceReason::Ok => "attendance confirmed",
            AttendanceReason::NoBooking => "no booking found for this event",
            AttendanceReason::NoScan => {
                "no successful attendance scan for this event"
            }
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Attendance {
    pub attended: bool,
    pub reason: AttendanceReason,
}

impl Attendance {
    fn ok() -> Self {
        Attendance {
            attended: true,
            reason: AttendanceReason::Ok,
        }
    }

    fn missing(reason: AttendanceReason) -> Self {
        Attendance {
            attended: false,
            reason,
        }
    }
}

/// Whether `user_id` counts as having attended `event`.
///
/// Staff bypass the checks entirely. Otherwise every enabled requirement
/// must hold: a live booking when bookings gate the event, and a successful
/// scan when QR attendance gates it. The reason names the first unmet
/// requirement so callers can tell the user what is missing.
pub fn verify_attendance(
    event: &Event,
    user_id: &str,
    role: Role,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Attendance, StorageError> {
    if matches!(role, Role::Staff) {
        return Ok(Attendance::ok());
    }

    if event.booking_enabled
        && Booking::active(&event.id, user_id, conn)?.is_none()
    {
        return Ok(Attendance::missing(AttendanceReason::NoBooking));
    }

    if event.qr_attendance_enabled
        && !has_successful_scan(&event.id, user_id, conn)?
    {
        return Ok(Attendance::missing(AttendanceReason::NoScan));
    }

    Ok(Attendance::ok())
}

pub fn has_successful_scan(
    event_id: &str,
    user_id: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<bool, StorageError> {
    diesel::select(diesel::dsl::exists(
        attendance_scans::table
            .filter(attendance_scans::event_id.eq(event_id))
            .filter(attendance_scans::user_id.eq(user_id))
            .filter(attendance_scans::scan_success.eq(true)),
    ))
    .get_result::<bool>(conn)
    .map_err(StorageError::from)
}

fn generate_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(22)
        .map(char::from)
        .collect()
}

pub async fn create_qr_code(
    Path(event_id): Path<String>,
    identity: Identity,
    mut conn: Conn,
) -> ApiResult<Json<QrCode>> {
    identity.require_staff()?;
    let event = Event::fetch(&event_id, &mut *conn)?;

    let qr_code = QrCode {
        id: Uuid::now_v7().to_string(),
        event_id: event.id,
        code: generate_code(),
        label: None,
        active: true,
        created_at: Utc::now().naive_utc(),
    };

    diesel::insert_into(attendance_qr_codes::table)
        .values(&qr_code)
        .execute(&mut *conn)
        .map_err(StorageError::from)?;

    Ok(Json(qr_code))
}
