use axum::{Json, extract::Path};
use chrono::{NaiveDateTime, Utc};
use diesel::{SqliteConnection, prelude::*};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    error::{ApiResult, StorageError},
    events::{
        Event,
        attendance::verify_attendance,
        bookings::{Booking, ensure_booking},
    },
    identity::{Identity, Role},
    schema::{certificates, notifications},
    state::Conn,
};

pub mod gate;

pub use gate::{Eligibility, GateDecision, GateFlags, SkipReason, Trigger};

#[derive(
    Queryable, Selectable, Identifiable, Insertable, Debug, Clone, Serialize,
)]
#[diesel(table_name = certificates)]
pub struct Certificate {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub booking_id: Option<String>,
    pub template_id: Option<String>,
    pub issued_at: NaiveDateTime,
}

/// Everything the issuer needs for one certificate.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub event_id: String,
    pub user_id: String,
    pub booking_id: Option<String>,
    pub template_id: Option<String>,
    pub send_email: bool,
}

#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub certificate_id: String,
    pub newly_issued: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("certificate issuance failed: {0}")]
pub struct IssueError(pub String);

/// Certificate issuance. Implementations must be idempotent per
/// (event, user): asking twice returns the same certificate.
pub trait CertificateIssuer: Send + Sync {
    fn issue(
        &self,
        req: &IssueRequest,
        conn: &mut SqliteConnection,
    ) -> Result<IssuedCertificate, IssueError>;
}

/// Fire-and-forget delivery of emails and push notifications. Failures are
/// the implementation's to log; callers never observe them.
pub trait Notifier: Send + Sync {
    fn notify(
        &self,
        kind: &str,
        payload: serde_json::Value,
        conn: &mut SqliteConnection,
    );
}

/// Issuer backed by the `certificates` table. The unique index on
/// (event_id, user_id) is the idempotency anchor: losing a race, or asking
/// again for an already-issued certificate, returns the existing row.
pub struct DbCertificateIssuer;

impl CertificateIssuer for DbCertificateIssuer {
    fn issue(
        &self,
        req: &IssueRequest,
        conn: &mut SqliteConnection,
    ) -> Result<IssuedCertificate, IssueError> {
        let certificate = Certificate {
            id: Uuid::now_v7().to_string(),
            event_id: req.event_id.clone(),
            user_id: req.user_id.clone(),
            booking_id: req.booking_id.clone(),
            template_id: req.template_id.clone(),
            issued_at: Utc::now().naive_utc(),
        };

        match diesel::insert_into(certificates::table)
            .values(&certificate)
            .execute(conn)
        {
            Ok(_) => Ok(IssuedCertificate {
                certificate_id: certificate.id,
                newly_issued: true,
            }),
            Err(error) => match StorageError::from(error) {
                StorageError::Duplicate => {
                    let existing = certificates::table
                        .filter(certificates::event_id.eq(&req.event_id))
                        .filter(certificates::user_id.eq(&req.user_id))
                        .first::<Certificate>(conn)
                        .map_err(|e| IssueError(e.to_string()))?;
                    Ok(IssuedCertificate {
                        certificate_id: existing.id,
                        newly_issued: false,
                    })
                }
                other => Err(IssueError(other.to_string())),
            },
        }
    }
}

/// Notifier that records a durable notification row; actual email and push
/// delivery drains the table elsewhere.
pub struct TableNotifier;

impl Notifier for TableNotifier {
    fn notify(
        &self,
        kind: &str,
        payload: serde_json::Value,
        conn: &mut SqliteConnection,
    ) {
        let user_id = payload
            .get("user_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let result = diesel::insert_into(notifications::table)
            .values((
                notifications::id.eq(Uuid::now_v7().to_string()),
                notifications::user_id.eq(user_id),
                notifications::kind.eq(kind),
                notifications::payload.eq(payload.to_string()),
                notifications::created_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn);

        match result {
            Ok(_) => info!(kind, "notification recorded"),
            Err(error) => {
                tracing::warn!(kind, %error, "failed to record notification");
            }
        }
    }
}

/// A side effect the gate wants performed.
#[derive(Debug)]
pub enum Action {
    IssueCertificate(IssueRequest),
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub certificate_issued: bool,
}

/// Execute gate actions. Issuer failures are logged with their full context
/// and handed to the notifier; they never propagate to the triggering
/// request.
pub fn dispatch(
    actions: Vec<Action>,
    issuer: &dyn CertificateIssuer,
    notifier: &dyn Notifier,
    conn: &mut SqliteConnection,
) -> DispatchReport {
    let mut report = DispatchReport::default();

    for action in actions {
        match action {
            Action::IssueCertificate(req) => {
                match issuer.issue(&req, conn) {
                    Ok(issued) => {
                        if issued.newly_issued {
                            info!(
                                event = %req.event_id,
                                user = %req.user_id,
                                certificate = %issued.certificate_id,
                                "certificate issued"
                            );
                            notifier.notify(
                                "certificate.issued",
                                json!({
                                    "certificate_id": issued.certificate_id,
                                    "event_id": req.event_id,
                                    "user_id": req.user_id,
                                    "send_email": req.send_email,
                                }),
                                conn,
                            );
                        }
                        report.certificate_issued = true;
                    }
                    Err(issue_error) => {
                        error!(
                            event = %req.event_id,
                            user = %req.user_id,
                            booking = ?req.booking_id,
                            template = ?req.template_id,
                            send_email = req.send_email,
                            error = %issue_error,
                            "certificate issuance failed"
                        );
                        notifier.notify(
                            "certificate.failed",
                            json!({
                                "event_id": req.event_id,
                                "user_id": req.user_id,
                                "error": issue_error.to_string(),
                            }),
                            conn,
                        );
                    }
                }
            }
        }
    }

    report
}

/// Evaluate the certificate gate for one (event, user) pair and execute
/// whatever it decides. All three workflow triggers funnel through here.
pub fn run_gate(
    event: &Event,
    user_id: &str,
    trigger: Trigger,
    issuer: &dyn CertificateIssuer,
    notifier: &dyn Notifier,
    conn: &mut SqliteConnection,
) -> DispatchReport {
    let actions = match plan(event, user_id, trigger, conn) {
        Ok(actions) => actions,
        Err(error) => {
            error!(
                event = %event.id,
                user = %user_id,
                ?trigger,
                %error,
                "certificate gate could not evaluate"
            );
            return DispatchReport::default();
        }
    };

    dispatch(actions, issuer, notifier, conn)
}

/// Load current eligibility, run the decision function, and turn an Issue
/// decision into actions. Booking flags are read fresh here so the gate
/// never acts on state captured before the triggering update.
fn plan(
    event: &Event,
    user_id: &str,
    trigger: Trigger,
    conn: &mut SqliteConnection,
) -> Result<Vec<Action>, StorageError> {
    let flags = GateFlags {
        auto_generate_certificate: event.auto_generate_certificate,
        feedback_required_for_certificate: event
            .feedback_required_for_certificate,
    };

    let booking = Booking::active(&event.id, user_id, conn)?;
    let attendance = verify_attendance(event, user_id, Role::Attendee, conn)?;

    let eligibility = Eligibility {
        attended: attendance.attended,
        checked_in: booking.as_ref().is_some_and(|b| b.checked_in),
        feedback_completed: booking
            .as_ref()
            .is_some_and(|b| b.feedback_completed),
    };

    match gate::evaluate(flags, trigger, eligibility) {
        GateDecision::Skip(reason) => {
            info!(
                event = %event.id,
                user = %user_id,
                ?trigger,
                ?reason,
                "certificate gate closed"
            );
            Ok(Vec::new())
        }
        GateDecision::Issue => {
            let booking = match booking {
                Some(booking) => booking,
                None => ensure_booking(&event.id, user_id, conn)?,
            };

            Ok(vec![Action::IssueCertificate(IssueRequest {
                event_id: event.id.clone(),
                user_id: user_id.to_string(),
                booking_id: Some(booking.id),
                template_id: event.certificate_template_id.clone(),
                send_email: event.certificate_auto_send_email,
            })])
        }
    }
}

pub async fn list_certificates(
    Path(event_id): Path<String>,
    identity: Identity,
    mut conn: Conn,
) -> ApiResult<Json<Vec<Certificate>>> {
    identity.require_staff()?;
    let event = Event::fetch(&event_id, &mut *conn)?;

    let issued = certificates::table
        .filter(certificates::event_id.eq(&event.id))
        .order_by(certificates::issued_at.asc())
        .load::<Certificate>(&mut *conn)
        .map_err(StorageError::from)?;

    Ok(Json(issued))
}
