use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use diesel::{
    SqliteConnection,
    r2d2::{ConnectionManager, Pool},
};
use diesel_migrations::MigrationHarness;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::{
    MIGRATIONS,
    events::{attendance, bookings, certificates, feedback, manage, sweep},
    state::{AppState, DbPool},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    /// When set, the server runs the post-event sweep on this interval in
    /// addition to whatever cron does with the `certsweep` binary.
    pub sweep_interval_secs: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            bind_addr: ([0, 0, 0, 0], 8460).into(),
            database_url: ":memory:".to_string(),
            sweep_interval_secs: None,
        }
    }
}

impl AppConfig {
    /// Reads the TOML config file (path in `MEDEVENTS_CONFIG`, default
    /// `medevents.toml`), then applies `DATABASE_URL` and `BIND_ADDR`
    /// environment overrides. A missing file just means defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("MEDEVENTS_CONFIG")
            .unwrap_or_else(|_| "medevents.toml".to_string());

        let mut config = match std::fs::read_to_string(&path) {
            Ok(raw) => toml::from_str(&raw)
                .with_context(|| format!("failed to parse {path}"))?,
            Err(_) => AppConfig::default(),
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(addr) = std::env::var("BIND_ADDR") {
            config.bind_addr = addr.parse().context("invalid BIND_ADDR")?;
        }

        Ok(config)
    }
}

pub fn build_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let pool: DbPool = Pool::builder()
        .max_size(if database_url == ":memory:" { 1 } else { 10 })
        .build(ConnectionManager::<SqliteConnection>::new(database_url))
        .context("failed to build connection pool")?;

    let mut conn = pool.get().context("failed to check out a connection")?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("failed to run migrations: {e}"))?;
    drop(conn);

    Ok(pool)
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/events", post(manage::create_event))
        .route("/events/:event_id", get(manage::view_event))
        .route(
            "/events/:event_id/bookings",
            post(bookings::create_booking),
        )
        .route(
            "/events/:event_id/bookings/cancel",
            post(bookings::cancel_booking),
        )
        .route(
            "/events/:event_id/qr-codes",
            post(attendance::create_qr_code),
        )
        .route(
            "/events/:event_id/attendance/scan",
            post(attendance::scan::record_scan),
        )
        .route(
            "/events/:event_id/feedback/forms",
            post(feedback::manage::create_form),
        )
        .route(
            "/events/:event_id/feedback/form",
            get(feedback::manage::active_form),
        )
        .route(
            "/events/:event_id/feedback/submit",
            post(feedback::submit::submit_feedback),
        )
        .route(
            "/events/:event_id/certificates",
            get(certificates::list_certificates),
        )
        .route("/admin/sweep", post(sweep::run_sweep_now))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
