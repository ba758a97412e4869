use anyhow::Result;
use rollcall_core::{PresenceEngine, Roster};
use rollcall_store::{Database, EnrollmentManager};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod seed;

use config::Config;
use dbus_interface::{AttendanceService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        db = %config.db_path.display(),
        captures = %config.captures_dir.display(),
        auto_enroll = config.auto_enroll,
        "rollcalld starting"
    );

    let db = Database::open(config.db_path.clone()).await?;

    // Session roster: optional seed file first, then every durably
    // enrolled student (durable entries win on id collision).
    let mut roster = Roster::new();
    if let Some(path) = &config.roster_seed {
        let entries = seed::load_roster_seed(path)?;
        tracing::info!(count = entries.len(), path = %path.display(), "roster seed loaded");
        for entry in entries {
            roster.upsert(entry);
        }
    }
    for entry in db.roster_entries().await? {
        roster.upsert(entry);
    }
    tracing::info!(total = roster.len(), "session roster initialized");

    let presence = PresenceEngine::new(roster, config.enroll_policy());
    let manager = EnrollmentManager::new(db, config.captures_dir.clone(), config.email_policy());
    let handle = engine::spawn_engine(presence, manager);

    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, AttendanceService::new(handle))?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
