//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/engine wiring for the configured backend
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};

use teller_infra::AppConfig;
use teller_ledger::StoreError;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> Result<Router, StoreError> {
    let services = services::build_services(config).await?;
    Ok(build_app_with(services))
}

/// Router over already-built services (tests use the in-memory backend).
pub fn build_app_with(services: services::AppServices) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(Extension(Arc::new(services)))
}
