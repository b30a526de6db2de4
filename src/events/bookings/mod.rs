use axum::{Json, extract::Path};
use chrono::{NaiveDateTime, Utc};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, StorageError},
    events::Event,
    identity::Identity,
    schema::bookings,
    state::Conn,
};

pub const STATUS_CONFIRMED: &str = "confirmed";
pub const STATUS_ATTENDED: &str = "attended";
pub const STATUS_CANCELLED: &str = "cancelled";

#[derive(
    Queryable, Selectable, Identifiable, Insertable, Debug, Clone, Serialize,
)]
#[diesel(table_name = bookings)]
pub struct Booking {
    pub id: String,
    pub event_id: String,
    pub user_id: Option<String>,
    pub status: String,
    pub checked_in: bool,
    pub feedback_completed: bool,
    pub created_at: NaiveDateTime,
}

impl Booking {
    /// The non-cancelled booking for (event, user), if any. The partial
    /// unique index guarantees at most one.
    pub fn active(
        event_id: &str,
        user_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Option<Booking>, StorageError> {
        bookings::table
            .filter(bookings::event_id.eq(event_id))
            .filter(bookings::user_id.eq(user_id))
            .filter(bookings::status.ne(STATUS_CANCELLED))
            .first::<Booking>(conn)
            .optional()
            .map_err(StorageError::from)
    }
}

/// Find-or-create the booking anchor for (event, user).
///
/// Callers only reach for this once attendance is otherwise established (a
/// successful scan, or a feedback submission that passed its checks), so an
/// implicit booking is created already attended and checked in.
pub fn ensure_booking(
    event_id: &str,
    user_id: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> Result<Booking, StorageError> {
    if let Some(existing) = Booking::active(event_id, user_id, conn)? {
        return Ok(existing);
    }

    let booking = Booking {
        id: Uuid::now_v7().to_string(),
        event_id: event_id.to_string(),
        user_id: Some(user_id.to_string()),
        status: STATUS_ATTENDED.to_string(),
        checked_in: true,
        feedback_completed: false,
        created_at: Utc::now().naive_utc(),
    };

    match diesel::insert_into(bookings::table)
        .values(&booking)
        .execute(conn)
    {
        Ok(_) => Ok(booking),
        // Lost a creation race: the unique index kept the winner's row, so
        // re-read and use that one.
        Err(error) => match StorageError::from(error) {
            StorageError::Duplicate => Booking::active(event_id, user_id, conn)?
                .ok_or(StorageError::Duplicate),
            other => Err(other),
        },
    }
}

#[derive(Serialize)]
pub struct BookingView {
    pub booking_id: String,
    pub status: String,
}

pub async fn create_booking(
    Path(event_id): Path<String>,
    identity: Identity,
    mut conn: Conn,
) -> ApiResult<Json<BookingView>> {
    let event = Event::fetch(&event_id, &mut *conn)?;

    if !event.booking_enabled {
        return Err(ApiError::BadRequest(
            "bookings are not enabled for this event".into(),
        ));
    }

    let booking = Booking {
        id: Uuid::now_v7().to_string(),
        event_id: event.id.clone(),
        user_id: Some(identity.user_id.clone()),
        status: STATUS_CONFIRMED.to_string(),
        checked_in: false,
        feedback_completed: false,
        created_at: Utc::now().naive_utc(),
    };

    match diesel::insert_into(bookings::table)
        .values(&booking)
        .execute(&mut *conn)
    {
        Ok(_) => Ok(Json(BookingView {
            booking_id: booking.id,
            status: booking.status,
        })),
        Err(error) => match StorageError::from(error) {
            StorageError::Duplicate => Err(ApiError::BadRequest(
                "you already have a booking for this event".into(),
            )),
            other => Err(other.into()),
        },
    }
}

pub async fn cancel_booking(
    Path(event_id): Path<String>,
    identity: Identity,
    mut conn: Conn,
) -> ApiResult<Json<BookingView>> {
    let event = Event::fetch(&event_id, &mut *conn)?;

    let booking = Booking::active(&event.id, &identity.user_id, &mut *conn)?
        .ok_or(ApiError::NotFound("booking"))?;

    diesel::update(bookings::table.find(&booking.id))
        .set(bookings::status.eq(STATUS_CANCELLED))
        .execute(&mut *conn)
        .map_err(StorageError::from)?;

    Ok(Json(BookingView {
        booking_id: booking.id,
        status: STATUS_CANCELLED.to_string(),
    }))
}
