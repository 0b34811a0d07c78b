//! Router assembly and shared application state.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::search::SearchEngine;

#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchEngine>,
}

pub fn build_app(search: Arc<SearchEngine>) -> Router {
    let state = AppState { search };

    Router::new()
        .route("/health", get(crate::server::routes::health::health))
        .route("/v1/search", get(crate::server::routes::search::search))
        .route(
            "/v1/search/suggest",
            get(crate::server::routes::search::suggest),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
