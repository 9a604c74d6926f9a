#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the EcoSensor map application.
//!
//! Loads the dataset manifest once at startup and serves `MapLibre` style
//! documents with one overlay layer per monitored feature. The style is
//! rebuilt by the pipeline on every `/api/style` request for the requested
//! pollutant and viewport.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use ecosensor_fetch::{EnvironmentConfig, Fetcher};
use ecosensor_layer::StyleDocument;
use ecosensor_pipeline::Pipeline;
use ecosensor_sensor_models::SourceEntry;
use tokio::sync::Mutex;

/// Shared application state.
pub struct AppState {
    /// Datasets listed by the manifest.
    pub manifest: Vec<SourceEntry>,
    /// Prefix for rendering source names.
    pub source_prefix: String,
    /// Fetch-to-layer pipeline. Locked only to begin and complete passes,
    /// never while a fetch is running.
    pub pipeline: Mutex<Pipeline>,
    /// The style document every pass reconciles into.
    pub document: Mutex<StyleDocument>,
}

impl AppState {
    /// Creates state serving `manifest` through `pipeline`.
    #[must_use]
    pub fn new(manifest: Vec<SourceEntry>, pipeline: Pipeline, source_prefix: &str) -> Self {
        Self {
            manifest,
            source_prefix: source_prefix.to_string(),
            pipeline: Mutex::new(pipeline),
            document: Mutex::new(StyleDocument::new()),
        }
    }
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/pollutants", web::get().to(handlers::pollutants))
            .route("/legend", web::get().to(handlers::legend))
            .route("/sources", web::get().to(handlers::sources))
            .route("/style", web::get().to(handlers::style)),
    );
}

/// Starts the EcoSensor map API server.
///
/// Reads the environment configuration, loads the manifest, and starts the
/// Actix-Web HTTP server. A manifest that fails to load is logged and the
/// server starts with no datasets. This is a regular async function; the
/// caller provides the async runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the configuration is invalid, the
/// HTTP client cannot be built, or the server fails to bind.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = EnvironmentConfig::from_env().map_err(std::io::Error::other)?;
    log::info!(
        "Environment: {} (source CRS {})",
        config.mode,
        config.source_crs
    );

    let fetcher = Fetcher::new(config.clone()).map_err(std::io::Error::other)?;
    let manifest = match fetcher.fetch_manifest().await {
        Ok(manifest) => manifest,
        Err(e) => {
            log::error!("Failed to load manifest: {e}");
            Vec::new()
        }
    };

    let pipeline = Pipeline::new(
        Arc::new(fetcher),
        config.schema_mode(),
        &config.source_prefix,
    );
    let state = web::Data::new(AppState::new(manifest, pipeline, &config.source_prefix));

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
