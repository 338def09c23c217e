pub mod adapters;
pub mod clock;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod ports;
pub mod services;
pub mod signing;
pub mod validation;

use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::clock::Clock;
use crate::ports::TenantDirectory;
use crate::services::TransactionLifecycle;

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<TransactionLifecycle>,
    pub tenants: Arc<dyn TenantDirectory>,
    pub clock: Arc<dyn Clock>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/transactions", post(handlers::transactions::create))
        .route("/transactions/:id", get(handlers::transactions::get))
        .route(
            "/transactions/:id/confirm",
            post(handlers::transactions::confirm),
        )
        .route(
            "/transactions/:id/cancel",
            post(handlers::transactions::cancel),
        )
        .route(
            "/tenants/:tenant_id/endpoints",
            post(handlers::endpoints::register).get(handlers::endpoints::list),
        )
        .route(
            "/tenants/:tenant_id/endpoints/:endpoint_id",
            patch(handlers::endpoints::update),
        )
        .route(
            "/tenants/:tenant_id/endpoints/:endpoint_id/rotate-secret",
            post(handlers::endpoints::rotate_secret),
        )
        .with_state(state)
}
