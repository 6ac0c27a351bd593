mod handlers;
pub mod middleware;

use std::time::Duration;

use axum::{
    http::{HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::engine::Engine;

pub use handlers::ErrorBody;
pub use middleware::{RateLimiter, SecurityConfig};

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    /// Client used for URL imports.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("granted/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { engine, http }
    }
}

pub fn create_router(engine: Engine, security: SecurityConfig) -> Router {
    let mut api = Router::new()
        // Projects
        .route("/projects", get(handlers::list_projects).post(handlers::create_project))
        .route(
            "/projects/{id}",
            get(handlers::get_project)
                .put(handlers::update_project)
                .delete(handlers::delete_project),
        )
        // Sessions
        .route("/bootstrap", get(handlers::bootstrap))
        .route("/sessions/{id}", get(handlers::get_session_state))
        .route(
            "/sessions/{id}/messages",
            get(handlers::list_messages).post(handlers::post_message),
        )
        // Sources
        .route(
            "/sessions/{id}/sources",
            get(handlers::list_sources).post(handlers::create_source),
        )
        .route("/sessions/{id}/sources/import-url", post(handlers::import_urls))
        .route("/sources/{id}", delete(handlers::delete_source))
        // Facts
        .route("/sessions/{id}/facts", get(handlers::list_facts))
        .route("/sessions/{id}/facts/answer", post(handlers::answer))
        .route("/sessions/{id}/facts/na", post(handlers::mark_not_applicable))
        .route("/facts/{id}/events", get(handlers::list_fact_events))
        // Coverage
        .route(
            "/sessions/{id}/coverage",
            get(handlers::coverage).post(handlers::coverage),
        )
        // Drafts
        .route("/sessions/{id}/drafts", get(handlers::list_drafts))
        .route(
            "/sessions/{id}/drafts/{section_id}",
            get(handlers::get_draft)
                .put(handlers::save_draft)
                .post(handlers::draft_section),
        )
        .route("/sessions/{id}/tighten", post(handlers::tighten))
        // Export
        .route("/export", post(handlers::export_markdown))
        .route("/sessions/{id}/export", post(handlers::export_session))
        // Jobs
        .route("/jobs", post(handlers::enqueue_job))
        .route("/jobs/tick", post(handlers::tick_jobs))
        .route("/jobs/{id}", get(handlers::get_job))
        .route("/jobs/{id}/logs", get(handlers::list_job_logs))
        .route("/sessions/{id}/jobs", get(handlers::list_session_jobs))
        // Discovered definition of done
        .route("/sessions/{id}/dod", get(handlers::get_dod))
        .route("/sessions/{id}/dod/history", get(handlers::get_dod_history))
        .route_layer(from_fn_with_state(
            security.clone(),
            middleware::require_api_key,
        ));

    if let Some(limiter) = security.rate_limiter.clone() {
        api = api.route_layer(from_fn_with_state(limiter, middleware::throttle));
    }

    // Health stays reachable without credentials
    let api = api.route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&security))
        .with_state(AppState::new(engine))
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    let Some(origins) = &security.cors_origins else {
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}
