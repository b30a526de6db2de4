use chrono::NaiveDateTime;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::Serialize;

use crate::{
    error::{ApiError, StorageError},
    schema::events,
};

pub mod attendance;
pub mod bookings;
pub mod certificates;
pub mod feedback;
pub mod manage;
pub mod sweep;

#[derive(
    Queryable, Selectable, Identifiable, Insertable, Debug, Clone, Serialize,
)]
#[diesel(table_name = events)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub venue: Option<String>,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub booking_enabled: bool,
    pub qr_attendance_enabled: bool,
    pub auto_generate_certificate: bool,
    pub certificate_template_id: Option<String>,
    pub certificate_auto_send_email: bool,
    pub feedback_required_for_certificate: bool,
    pub created_at: NaiveDateTime,
}

impl Event {
    pub fn fetch(
        event_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Self, ApiError> {
        events::table
            .filter(events::id.eq(event_id))
            .first::<Event>(conn)
            .optional()
            .map_err(StorageError::from)?
            .ok_or(ApiError::NotFound("event"))
    }
}
