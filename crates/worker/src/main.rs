use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use workbench_core::config::EngineConfig;
use workbench_db::access::Workbench;

/// Maintenance worker.
///
/// Rebuilds the materialised project-tree paths once at start-up, then
/// again every `TREE_REBUILD_INTERVAL_SECS` seconds when that is set.
#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "workbench_worker=debug,workbench_db=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = EngineConfig::from_env().expect("Invalid engine configuration");
    tracing::info!(
        lock_ttl_mins = config.locks.normal.num_minutes(),
        webdav_lock_ttl_mins = config.locks.webdav.num_minutes(),
        manager_role = %config.manager_role,
        curator_role = %config.curator_role,
        "Loaded engine configuration"
    );
    let interval = std::env::var("TREE_REBUILD_INTERVAL_SECS")
        .ok()
        .map(|v| v.parse::<u64>().expect("TREE_REBUILD_INTERVAL_SECS must be a valid u64"))
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = workbench_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    workbench_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    workbench_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let workbench = Workbench::new(pool, config);
    rebuild(&workbench).await;

    let Some(period) = interval else {
        return;
    };
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => rebuild(&workbench).await,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }
}

async fn rebuild(workbench: &Workbench) {
    match workbench.rebuild_all_trees().await {
        Ok(changed) => tracing::info!(changed, "Project trees rebuilt"),
        Err(e) => tracing::error!(error = %e, "Project tree rebuild failed"),
    }
}
