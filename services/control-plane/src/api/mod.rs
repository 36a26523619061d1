//! HTTP API handlers and routing.

mod definitions;
mod discovery;
pub mod error;
mod events;
mod health;
mod resources;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the API router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(discovery::routes())
        .merge(definitions::routes())
        .merge(resources::routes())
        .merge(events::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
