use std::path::PathBuf;

use clap::Parser;

use crate::config::{ConfigError, GatewayConfig};

/// Blue/green HTTP gateway.
#[derive(Parser, Debug, Default)]
#[command(name = "bluegreen", version)]
#[command(about = "Blue/green reverse proxy with a management API", long_about = None)]
pub struct Cli {
    /// Gateway settings file (TOML). Defaults to the user config directory.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Service map document (JSON).
    #[arg(short, long)]
    pub services_file: Option<PathBuf>,

    /// Data-plane listen address, e.g. 0.0.0.0:8000.
    #[arg(long)]
    pub proxy_addr: Option<String>,

    /// Management API listen address, e.g. 127.0.0.1:8001.
    #[arg(long)]
    pub admin_addr: Option<String>,
}

impl Cli {
    /// Load the settings file and apply command-line overrides.
    pub fn resolve_config(&self) -> Result<GatewayConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => GatewayConfig::load_from(path)?,
            None => GatewayConfig::load()?,
        };
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut GatewayConfig) {
        if let Some(path) = &self.services_file {
            config.services_file = path.clone();
        }
        if let Some(addr) = &self.proxy_addr {
            config.proxy.bind_addr = addr.clone();
        }
        if let Some(addr) = &self.admin_addr {
            config.admin.bind_addr = addr.clone();
        }
    }
}
