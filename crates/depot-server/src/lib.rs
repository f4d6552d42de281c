//! # depot-server
//!
//! Serves per-terminal deployment packages from an artifact store.
//!
//! - `GET /artifacts/{terminal_id}/{tag}`: terminal package as `application/zip`
//! - `GET /health`: liveness probe
//!
//! All errors map to structured JSON responses via [`AppError`].

pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

pub use error::AppError;
pub use state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(routes::artifacts::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
