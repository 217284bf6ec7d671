//! SIPAT Short-Route Engine
//!
//! Serves short-route assignment, lifecycle and weekly balances over HTTP.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sipat_rutas::catalog::TramoCatalog;
use sipat_rutas::fleet::Fleet;
use sipat_rutas::planner::{Planner, SystemClock};
use sipat_rutas::settings::Settings;
use sipat_rutas::{api, db, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting SIPAT short-route engine");

    let settings = Settings::load()?;
    info!(?settings, "Configuration loaded");

    let (catalog, fleet) = match db::load_reference_data(&settings).await {
        Ok(data) => data,
        Err(e) => {
            warn!("Failed to load reference data from SurrealDB: {:#}. Starting empty.", e);
            (TramoCatalog::new(), Fleet::new())
        }
    };

    let planner = Planner::new(settings.rules.clone(), catalog, fleet, Arc::new(SystemClock));
    let state = Arc::new(AppState::new(settings.clone(), planner));

    // Spawn background reload task
    if settings.catalog_reload_interval_secs > 0 {
        let state_clone = Arc::clone(&state);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(
                state_clone.settings.catalog_reload_interval_secs,
            ));
            // The first tick fires immediately and the data was just loaded
            interval.tick().await;
            loop {
                interval.tick().await;
                match db::load_reference_data(&state_clone.settings).await {
                    Ok((catalog, fleet)) => {
                        state_clone.planner.write().await.reload(catalog, fleet);
                        info!("Reference data reloaded");
                    }
                    Err(e) => warn!("Periodic reload failed: {:#}", e),
                }
            }
        });
    }

    let addr = format!("0.0.0.0:{}", settings.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, api::router(state)).await?;

    Ok(())
}
