//! HTTP API server

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::storage::DocumentStore;

pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

/// Build the API router using the provided application state
pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/visa", post(handlers::create_visa))
        .route("/visas", get(handlers::list_visas))
        .route(
            "/visa/:id",
            get(handlers::get_visa)
                .put(handlers::update_visa)
                .delete(handlers::delete_visa),
        )
        .route("/latest-visas", get(handlers::latest_visas))
        .route("/my-added-visas", get(handlers::my_added_visas))
        .route("/apply-visa", post(handlers::apply_visa))
        .route("/my-visa-applications", get(handlers::my_visa_applications))
        .route(
            "/cancel-visa-application",
            delete(handlers::cancel_visa_application),
        )
        .with_state(state);

    with_layers(router)
}

/// Router served when the store could not be reached at startup: only the
/// banner and an unavailable health check
pub fn create_offline_router() -> Router {
    let router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_offline));

    with_layers(router)
}

/// Convenience helper building the router straight from a store
pub fn create_store_router(store: Arc<dyn DocumentStore>) -> Router {
    create_router(AppState::from_store(store))
}

fn with_layers(router: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router.layer(cors).layer(TraceLayer::new_for_http())
}
