//! Management API served on the control-plane port.
//!
//! A thin HTTP layer over `ServiceRouter`: every endpoint maps to one
//! registry operation, and registry errors map to status codes through
//! `AdminError`.

mod error;
mod handlers;
mod health;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use chrono::{DateTime, Local};

use crate::backend::ServiceRouter;
use crate::proxy::ShutdownManager;

pub use error::AdminError;
pub use handlers::{AddServiceRequest, GatewayStatus, ServiceStatus, SwitchRecord};
pub use health::{HealthProbe, HealthStatus, ServiceHealth};

/// Shared state for management handlers.
#[derive(Clone)]
pub struct AdminState {
    pub router: ServiceRouter,
    pub shutdown: Arc<ShutdownManager>,
    pub proxy_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub health: HealthProbe,
    pub started_at: DateTime<Local>,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/status", get(handlers::status))
        .route("/switch", post(handlers::switch))
        .route("/config", post(handlers::update_config))
        .route("/config/save", post(handlers::save_config))
        .route(
            "/services",
            get(handlers::list_services).post(handlers::add_service),
        )
        .route("/services/{id}", delete(handlers::remove_service))
        .route("/health", get(handlers::health))
        .route("/health/services", get(handlers::health_all))
        .route("/health/services/{id}", get(handlers::health_one))
        .with_state(state)
}
