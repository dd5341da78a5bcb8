use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root gateway configuration container.
///
/// Only process-level settings live here. The routing table itself is the
/// service map document referenced by `services_file`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Path of the JSON service map document.
    #[serde(default = "default_services_file")]
    pub services_file: PathBuf,
    /// Seconds to wait for open connections to drain on shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u32,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

/// Data-plane listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Bind address for the traffic-carrying listener (host:port).
    #[serde(default = "default_proxy_bind_addr")]
    pub bind_addr: String,
}

/// Control-plane listener for the management API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Bind address for the management listener (host:port).
    #[serde(default = "default_admin_bind_addr")]
    pub bind_addr: String,
}

/// Outbound client policy shared by every forwarding client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// TCP connect timeout in seconds (default: 10).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
    /// Upper bound on waiting for response headers (default: 900).
    /// Body transfer is never bounded, so streaming responses stay open.
    #[serde(default = "default_response_header_timeout")]
    pub response_header_timeout_seconds: u32,
    /// Pool idle timeout in seconds (default: 90).
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_seconds: u32,
    /// Max idle connections per host (default: 10).
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: u32,
}

/// Active-target probing used by the management API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Path appended to the active target when probing.
    #[serde(default = "default_health_path")]
    pub path: String,
    /// Probe timeout in seconds (default: 3).
    #[serde(default = "default_health_timeout")]
    pub timeout_seconds: u32,
}

fn default_services_file() -> PathBuf {
    PathBuf::from("configs/proxy_config.json")
}

fn default_shutdown_grace() -> u32 {
    10
}

fn default_proxy_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_admin_bind_addr() -> String {
    "127.0.0.1:8001".to_string()
}

fn default_connect_timeout() -> u32 {
    10
}

fn default_response_header_timeout() -> u32 {
    900
}

fn default_pool_idle_timeout() -> u32 {
    90
}

fn default_pool_max_idle_per_host() -> u32 {
    10
}

fn default_health_path() -> String {
    "/actuator/health".to_string()
}

fn default_health_timeout() -> u32 {
    3
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds.into())
    }

    pub fn response_header_timeout(&self) -> Duration {
        Duration::from_secs(self.response_header_timeout_seconds.into())
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_seconds.into())
    }
}

impl HealthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.into())
    }
}

impl GatewayConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds.into())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            services_file: default_services_file(),
            shutdown_grace_seconds: default_shutdown_grace(),
            proxy: ProxyConfig::default(),
            admin: AdminConfig::default(),
            upstream: UpstreamConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_proxy_bind_addr(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_admin_bind_addr(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: default_connect_timeout(),
            response_header_timeout_seconds: default_response_header_timeout(),
            pool_idle_timeout_seconds: default_pool_idle_timeout(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            path: default_health_path(),
            timeout_seconds: default_health_timeout(),
        }
    }
}
