mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use stockroom_cart::CartEngine;
use stockroom_catalog::{CatalogJobs, JobTracker};
use stockroom_core::{Clock, SystemClock};
use stockroom_db::PgStore;
use tracing_subscriber::EnvFilter;

use crate::api::{build_app, default_rate_limit_state, AccessPolicy, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = stockroom_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = stockroom_db::PoolConfig::from_app_config(&config);
    let pool = stockroom_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = stockroom_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    let store = Arc::new(PgStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let jobs = match CatalogJobs::from_config(&config, store.clone(), store.clone(), clock.clone())
    {
        Ok(jobs) => Some(jobs),
        Err(e) => {
            tracing::warn!(error = %e, "catalog jobs disabled; sync schedule not registered");
            None
        }
    };

    let _scheduler = match &jobs {
        Some(jobs) => Some(scheduler::build_scheduler(jobs.clone(), &config.sync_cron).await?),
        None => None,
    };

    let access = AccessPolicy::from_config(&config)?;
    let state = AppState {
        catalog: store.clone(),
        runs: store.clone(),
        carts: CartEngine::new(store.clone(), clock, config.cart_limits()),
        tracker: JobTracker::from_config(&config, store),
        jobs,
    };
    let app = build_app(state, access, default_rate_limit_state());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
