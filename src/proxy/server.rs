use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::admin::{build_admin_router, AdminState, HealthProbe};
use crate::backend::ServiceRouter;
use crate::config::GatewayConfig;
use crate::proxy::connection::ConnectionCounter;
use crate::proxy::router::build_proxy_router;
use crate::proxy::shutdown::ShutdownManager;

/// Errors that can occur while starting or running the listeners.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid bind address '{addr}': {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build health probe client: {0}")]
    HealthClient(#[source] reqwest::Error),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// The data-plane and management listeners sharing one registry.
pub struct GatewayServer {
    proxy_addr: SocketAddr,
    admin_addr: SocketAddr,
    /// Bound at construction so the ports are held until `run`.
    proxy_listener: TcpListener,
    admin_listener: TcpListener,
    router: ServiceRouter,
    shutdown: Arc<ShutdownManager>,
    health: HealthProbe,
    grace: Duration,
}

impl GatewayServer {
    /// Bind both configured addresses.
    ///
    /// A port of `0` picks a free port; the actual addresses are available
    /// from `proxy_addr()` and `admin_addr()` afterwards.
    pub async fn bind(config: &GatewayConfig, router: ServiceRouter) -> Result<Self, ServerError> {
        let proxy_listener = bind_listener(&config.proxy.bind_addr).await?;
        let admin_listener = bind_listener(&config.admin.bind_addr).await?;
        let proxy_addr = proxy_listener.local_addr()?;
        let admin_addr = admin_listener.local_addr()?;
        let health = HealthProbe::new(&config.health).map_err(ServerError::HealthClient)?;

        tracing::info!(proxy = %proxy_addr, admin = %admin_addr, "Listeners bound");

        Ok(Self {
            proxy_addr,
            admin_addr,
            proxy_listener,
            admin_listener,
            router,
            shutdown: Arc::new(ShutdownManager::new()),
            health,
            grace: config.shutdown_grace(),
        })
    }

    pub fn proxy_addr(&self) -> SocketAddr {
        self.proxy_addr
    }

    pub fn admin_addr(&self) -> SocketAddr {
        self.admin_addr
    }

    pub fn router(&self) -> ServiceRouter {
        self.router.clone()
    }

    pub fn handle(&self) -> GatewayHandle {
        GatewayHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Serve until ctrl-c, SIGTERM or `GatewayHandle::shutdown`.
    ///
    /// After the signal both listeners stop accepting; open connections get
    /// up to the configured grace period to finish.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = self.shutdown.clone();

        let admin_app = build_admin_router(AdminState {
            router: self.router.clone(),
            shutdown: shutdown.clone(),
            proxy_addr: self.proxy_addr,
            admin_addr: self.admin_addr,
            health: self.health,
            started_at: chrono::Local::now(),
        });
        let proxy_app = build_proxy_router(self.router)
            .into_make_service_with_connect_info::<SocketAddr>();
        let proxy_service = ConnectionCounter::new(proxy_app, shutdown.clone());

        let signals = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.listen_for_signals().await })
        };

        tracing::info!(addr = %self.proxy_addr, "Proxy listening");
        tracing::info!(addr = %self.admin_addr, "Admin API listening");

        let proxy = axum::serve(self.proxy_listener, proxy_service)
            .with_graceful_shutdown(wait_for_shutdown(shutdown.clone()))
            .into_future();
        let admin = axum::serve(self.admin_listener, admin_app)
            .with_graceful_shutdown(wait_for_shutdown(shutdown.clone()))
            .into_future();
        let serving = async { tokio::try_join!(proxy, admin) };
        tokio::pin!(serving);

        let grace = self.grace;
        let deadline = async {
            shutdown.shutdown_requested().await;
            shutdown.wait_for_connections(grace).await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        };

        let result = tokio::select! {
            result = &mut serving => result.map(|_| ()),
            _ = deadline => {
                tracing::warn!(
                    remaining = shutdown.active_connections(),
                    "Grace period elapsed, closing remaining connections"
                );
                Ok(())
            }
        };

        signals.abort();
        tracing::info!("Shutting down gracefully");
        result.map_err(ServerError::Io)
    }
}

/// Cloneable handle for stopping a running server.
#[derive(Clone)]
pub struct GatewayHandle {
    shutdown: Arc<ShutdownManager>,
}

impl GatewayHandle {
    pub fn shutdown(&self) {
        self.shutdown.signal_shutdown();
    }
}

async fn wait_for_shutdown(shutdown: Arc<ShutdownManager>) {
    shutdown.shutdown_requested().await;
}

async fn bind_listener(addr: &str) -> Result<TcpListener, ServerError> {
    let addr: SocketAddr = addr.parse().map_err(|e| ServerError::InvalidAddress {
        addr: addr.to_string(),
        source: e,
    })?;
    TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind { addr, source: e })
}
