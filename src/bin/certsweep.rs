//! One-shot post-event certificate sweep, intended to run from cron:
//!
//! ```text
//! */15 * * * *  certsweep --database-url /var/lib/medevents/data.sqlite
//! ```

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use medevents::{
    config::build_pool,
    events::{
        certificates::{DbCertificateIssuer, TableNotifier},
        sweep::run_post_event_sweep,
    },
};

#[derive(Parser, Debug)]
#[command(name = "certsweep")]
#[command(about = "Run the post-event certificate sweep once")]
struct Args {
    /// SQLite database to sweep.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medevents=info".into()),
        )
        .init();

    let args = Args::parse();

    let pool = build_pool(&args.database_url)?;
    let mut conn = pool
        .get()
        .context("could not open a database connection")?;

    let summary = run_post_event_sweep(
        chrono::Utc::now().naive_utc(),
        &DbCertificateIssuer,
        &TableNotifier,
        &mut conn,
    )?;

    println!(
        "swept {} event(s); {} candidate(s), {} certificate(s) issued",
        summary.events_swept, summary.candidates, summary.certificates_issued
    );

    Ok(())
}
