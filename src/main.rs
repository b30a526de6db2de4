use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use medevents::{
    config::{AppConfig, build_pool, create_app},
    events::{
        certificates::{DbCertificateIssuer, TableNotifier},
        sweep::run_post_event_sweep,
    },
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(
            |_| "medevents=info,tower_http=info".into(),
        ))
        .init();

    let config = AppConfig::load()?;
    let pool = build_pool(&config.database_url)?;

    let state = AppState {
        pool,
        issuer: Arc::new(DbCertificateIssuer),
        notifier: Arc::new(TableNotifier),
    };

    if let Some(secs) = config.sweep_interval_secs {
        spawn_sweep_timer(state.clone(), secs);
    }

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!("listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn spawn_sweep_timer(state: AppState, secs: u64) {
    info!(interval_secs = secs, "starting in-process sweep timer");

    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(secs));

        loop {
            ticker.tick().await;

            let state = state.clone();
            let result = tokio::task::spawn_blocking(move || {
                let mut conn = state
                    .pool
                    .get()
                    .map_err(|e| anyhow::anyhow!("pool: {e}"))?;
                run_post_event_sweep(
                    chrono::Utc::now().naive_utc(),
                    state.issuer.as_ref(),
                    state.notifier.as_ref(),
                    &mut conn,
                )
                .map_err(anyhow::Error::from)
            })
            .await;

            match result {
                Ok(Ok(summary)) => debug!(
                    issued = summary.certificates_issued,
                    "scheduled sweep complete"
                ),
                Ok(Err(error)) => error!(%error, "scheduled sweep failed"),
                Err(error) => error!(%error, "scheduled sweep panicked"),
            }
        }
    });
}
