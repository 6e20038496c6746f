#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server exposing the safety-watch risk pipeline.
//!
//! Sessions map one-to-one onto [`LocationContext`]s: opening a
//! location starts the concurrent fetches and returns immediately;
//! polling the session returns whatever partial results have arrived so
//! far, with the risk state `LOADING` until both prerequisites resolve.
//! Superseding a session drops its context, which cancels any still
//! in-flight work.

pub mod handlers;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use safety_watch_context::{LocationContext, Sources};
use safety_watch_source::events::{DEFAULT_EVENTS_URL, HttpEventSource};
use safety_watch_source::nominatim::{DEFAULT_POI_URL, NominatimPoiSearch};
use safety_watch_source::recommendations::{DEFAULT_RECS_URL, HttpRecommendationSource};
use safety_watch_source::stations::PoiStationSource;
use safety_watch_source::EmptyProfile;

/// Maximum number of concurrently open sessions.
pub const MAX_SESSIONS: usize = 256;

/// Shared application state.
pub struct AppState {
    /// The dependency-injected source collaborators.
    pub sources: Arc<Sources>,
    /// Open sessions by id. Dropping an entry cancels its in-flight
    /// fetches.
    pub sessions: RwLock<HashMap<String, LocationContext>>,
}

impl AppState {
    /// Creates state around a set of sources.
    #[must_use]
    pub fn new(sources: Arc<Sources>) -> Self {
        Self {
            sources,
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

/// Builds the production source set from environment overrides, falling
/// back to the deployed endpoints.
///
/// Env: `SAFETY_WATCH_RECS_URL`, `SAFETY_WATCH_EVENTS_URL`,
/// `SAFETY_WATCH_POI_URL`.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be constructed.
pub fn default_sources() -> Result<Arc<Sources>, reqwest::Error> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("safety-watch/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let recs_url = std::env::var("SAFETY_WATCH_RECS_URL")
        .unwrap_or_else(|_| DEFAULT_RECS_URL.to_string());
    let events_url = std::env::var("SAFETY_WATCH_EVENTS_URL")
        .unwrap_or_else(|_| DEFAULT_EVENTS_URL.to_string());
    let poi_url =
        std::env::var("SAFETY_WATCH_POI_URL").unwrap_or_else(|_| DEFAULT_POI_URL.to_string());

    let poi = Arc::new(NominatimPoiSearch::new(client.clone(), poi_url));

    Ok(Arc::new(Sources {
        recommendations: Arc::new(HttpRecommendationSource::new(client.clone(), recs_url)),
        stations: Arc::new(PoiStationSource::new(poi)),
        events: Arc::new(HttpEventSource::new(client, events_url)),
        profile: Arc::new(EmptyProfile),
    }))
}

/// Starts the API server.
///
/// Env: `BIND_ADDR` (default `127.0.0.1`), `PORT` (default `8080`),
/// plus the source URLs read by [`default_sources`].
///
/// # Errors
///
/// Returns an error if the HTTP server fails to bind or encounters a
/// runtime error.
///
/// # Panics
///
/// Panics if the shared HTTP client cannot be constructed.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let sources = default_sources().expect("Failed to build HTTP client");
    let state = actix_web::web::Data::new(AppState::new(sources));

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    actix_web::HttpServer::new(move || {
        let cors = actix_cors::Cors::permissive();

        actix_web::App::new()
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .app_data(state.clone())
            .service(
                actix_web::web::scope("/api")
                    .route("/health", actix_web::web::get().to(handlers::health))
                    .route(
                        "/locations",
                        actix_web::web::post().to(handlers::open_location),
                    )
                    .route(
                        "/locations/{id}",
                        actix_web::web::get().to(handlers::location_snapshot),
                    )
                    .route(
                        "/locations/{id}",
                        actix_web::web::delete().to(handlers::close_location),
                    ),
            )
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
