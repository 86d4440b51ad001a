use std::{sync::Arc, time::Duration};

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod session;

use session::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub dispatch_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, dispatch_timeout: Option<Duration>) -> Self {
        Self {
            registry,
            dispatch_timeout,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .route(
            "/mcp",
            post(http::handlers::mcp_endpoint).delete(http::handlers::close_session),
        )
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
