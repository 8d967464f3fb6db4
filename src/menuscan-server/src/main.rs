use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use menuscan_core::*;
use menuscan_server::{api, telemetry};
use std::path::Path;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> Result<()> {
    // Keep the guard alive so buffered log lines are flushed on exit
    let _guard = telemetry::init_telemetry(Path::new("./logs"))?;

    let config = Config::load("config.json")
        .unwrap_or_else(|_| {
            tracing::warn!("Failed to load config.json, using defaults");
            Config::default()
        })
        .apply_env();

    tracing::info!("menuscan starting");
    tracing::info!("  Database: {}.{}", config.database, config.collection);
    tracing::info!("  Port: {}", config.port);
    tracing::info!(
        "  Install: batch_size={}, workers={}, seed={}",
        config.install.batch_size,
        config.install.workers,
        config.install.seed
    );
    tracing::info!(
        "  Search: default_index={}, result_limit={}",
        config.search.default_index,
        config.search.result_limit
    );
    tracing::info!(
        "  CORS: enabled={}, origins={:?}",
        config.cors.enabled,
        config.cors.allowed_origins
    );

    let store = Arc::new(
        MongoStore::connect(&config.mongodb_uri, &config.database, &config.collection).await?,
    );
    tracing::info!("✓ MongoDB store initialized");

    let app_state = web::Data::new(api::AppState::from_store(store.clone(), config.clone()));

    let bind_addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("🚀 Starting HTTP server on {}", bind_addr);

    let cors_config = config.cors.clone();
    let server = HttpServer::new(move || {
        let mut cors = Cors::default();

        if cors_config.enabled {
            for origin in &cors_config.allowed_origins {
                cors = cors.allowed_origin(origin);
            }
            cors = cors
                .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                .allowed_headers(vec![
                    actix_web::http::header::ACCEPT,
                    actix_web::http::header::CONTENT_TYPE,
                ])
                .max_age(3600);
        }

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(TracingLogger::default())
            .configure(api::configure)
    })
    .bind(&bind_addr)?
    .run();

    tracing::info!("Server running, press Ctrl+C to stop");

    server.await?;

    tracing::info!("Closing MongoDB connection...");
    store.as_ref().clone().shutdown().await;

    Ok(())
}
