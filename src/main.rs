use anyhow::Context;
use clap::Parser;

use bluegreen::backend::{BackendDialer, ServiceRouter};
use bluegreen::cli::Cli;
use bluegreen::config::ServiceConfigStore;
use bluegreen::proxy::tracing::init_tracing;
use bluegreen::proxy::GatewayServer;

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("Gateway stopped: {e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.resolve_config().context("Failed to load gateway config")?;

    let store = ServiceConfigStore::new(&config.services_file);
    let dialer = BackendDialer::new(config.upstream.clone());
    let router = ServiceRouter::load(store, dialer).with_context(|| {
        format!(
            "Failed to load service map from {}",
            config.services_file.display()
        )
    })?;

    let server = GatewayServer::bind(&config, router).await?;
    tracing::info!(
        proxy = %server.proxy_addr(),
        admin = %server.admin_addr(),
        services_file = %config.services_file.display(),
        "Gateway started"
    );

    server.run().await?;
    Ok(())
}
