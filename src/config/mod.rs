//! Gateway settings and the persisted service map.

mod loader;
mod services;
mod store;
mod types;

pub use loader::ConfigError;
pub use services::{Environment, InvalidEnvironment, ServiceMap, ServiceRecord, DEFAULT_SERVICE_ID};
pub use store::ServiceConfigStore;
pub use types::{AdminConfig, GatewayConfig, HealthConfig, ProxyConfig, UpstreamConfig};
