//! # vigild: vigil daemon
//!
//! Composition root that wires the alarm coordinator to its adapters and
//! starts the server.
//!
//! ## Responsibilities
//! - Load configuration (`vigil.toml`, env vars)
//! - Initialize logging, the `SQLite` pool and migrations
//! - Provision configured people and sync their alarm call trees
//! - Compile the alarm registry; a bad predicate aborts startup
//! - Run the coordinator's timer loop and the HTTP server
//! - Shut down gracefully on SIGINT/SIGTERM
//!
//! No alarm logic belongs here.

mod config;
mod notifier;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use vigil_adapter_http_axum::router;
use vigil_adapter_http_axum::state::AppState;
use vigil_adapter_storage_sqlite_sqlx::{
    self as storage, SqliteCallTreeRepository, SqliteIncidentRepository, SqlitePersonDirectory,
};
use vigil_app::coordinator::AlarmCoordinator;
use vigil_app::ports::SystemClock;
use vigil_app::scheduler::TokioScheduler;
use vigil_app::services::call_tree_service::CallTreeService;
use vigil_domain::alarm::{ALARM_CALL_TREE, AlarmRegistry};
use vigil_domain::id::{PersonId, PlaceId};

use crate::config::Config;
use crate::notifier::LogNotifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Database
    let db = storage::Config {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await
    .context("failed to open database")?;
    let pool = db.pool().clone();

    // Repositories
    let people = SqlitePersonDirectory::new(pool.clone());
    let call_trees = CallTreeService::new(SqliteCallTreeRepository::new(pool.clone()), people.clone());
    let incidents = SqliteIncidentRepository::new(pool);

    provision_people(&config, &people, &call_trees).await?;

    let registry = AlarmRegistry::standard(&config.alarm_settings()?)
        .context("failed to compile alarm registry")?;
    tracing::info!(alarm_types = registry.definitions().count(), "alarm registry compiled");

    let (coordinator, inbox) = AlarmCoordinator::new(
        Arc::new(registry),
        incidents,
        call_trees,
        LogNotifier,
        TokioScheduler,
        SystemClock,
        config.escalation_settings(),
    );
    tokio::spawn(coordinator.clone().process_timers(inbox));

    // HTTP
    let app = router::build(AppState::new(coordinator));

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(%bind_addr, "vigild listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("vigild stopped");
    Ok(())
}

/// Upsert the configured people, then sync the alarm call tree of every
/// place they belong to.
async fn provision_people(
    config: &Config,
    people: &SqlitePersonDirectory,
    call_trees: &CallTreeService<SqliteCallTreeRepository, SqlitePersonDirectory>,
) -> anyhow::Result<()> {
    let mut owners: BTreeMap<PlaceId, Option<PersonId>> = BTreeMap::new();
    for entry in &config.people {
        people
            .upsert(&entry.to_person())
            .await
            .with_context(|| format!("failed to store person {}", entry.id))?;
        let owner = owners.entry(entry.place_id).or_default();
        if entry.owner {
            *owner = Some(entry.id);
        }
    }

    for (place_id, owner) in owners {
        let tree = call_trees
            .sync_call_tree(place_id, ALARM_CALL_TREE, owner)
            .await
            .with_context(|| format!("failed to sync call tree of place {place_id}"))?;
        tracing::info!(%place_id, entries = tree.entries().len(), "alarm call tree ready");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
