//! Axum router construction.
//!
//! The bot itself talks to Telegram by long polling; HTTP only serves the
//! health check for load balancers and process supervisors.

mod health;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Build the complete Axum [`Router`] for the application.
pub fn build() -> Router {
    Router::new()
        .merge(health::router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
