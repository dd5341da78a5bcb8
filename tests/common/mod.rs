//! Shared test utilities and mock infrastructure.

#![allow(dead_code, unused_imports)]

pub mod mock_backend;

use bluegreen::backend::{BackendDialer, ServiceRouter};
use bluegreen::config::{
    Environment, GatewayConfig, ServiceConfigStore, ServiceMap, ServiceRecord, UpstreamConfig,
};
use bluegreen::proxy::{GatewayHandle, GatewayServer};
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Find an available port for testing.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to free port");
    listener.local_addr().unwrap().port()
}

/// Wait for a server to become available.
pub async fn wait_for_server(addr: SocketAddr, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// A record with the given targets, active on blue.
pub fn record(blue: &str, green: &str) -> ServiceRecord {
    ServiceRecord {
        name: String::new(),
        blue_target: blue.to_string(),
        green_target: green.to_string(),
        active_env: Environment::Blue,
        jar_file: String::new(),
        app_name: String::new(),
    }
}

/// Build a document from `(id, blue, green)` triples.
pub fn document(services: &[(&str, &str, &str)]) -> ServiceMap {
    let mut document = ServiceMap::default();
    for (id, blue, green) in services {
        document
            .services
            .insert(id.to_string(), record(blue, green));
    }
    document
}

/// Write `document` into a fresh temp dir and return the store for it.
pub fn temp_store(document: &ServiceMap) -> (TempDir, ServiceConfigStore) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = ServiceConfigStore::new(temp_dir.path().join("proxy_config.json"));
    store.save(document).expect("Failed to write service map");
    (temp_dir, store)
}

/// Gateway settings for tests: ephemeral ports, short timeouts.
pub fn test_config(services_file: PathBuf) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.services_file = services_file;
    config.proxy.bind_addr = "127.0.0.1:0".to_string();
    config.admin.bind_addr = "127.0.0.1:0".to_string();
    config.shutdown_grace_seconds = 1;
    config.upstream = UpstreamConfig {
        connect_timeout_seconds: 2,
        response_header_timeout_seconds: 5,
        pool_idle_timeout_seconds: 30,
        pool_max_idle_per_host: 2,
    };
    config.health.timeout_seconds = 1;
    config
}

/// A running gateway on ephemeral ports.
pub struct TestGateway {
    pub proxy_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub router: ServiceRouter,
    pub handle: GatewayHandle,
    pub task: tokio::task::JoinHandle<()>,
    pub dir: TempDir,
}

impl TestGateway {
    /// Persist `document`, load it back through the registry and serve it.
    pub async fn start(document: ServiceMap) -> Self {
        Self::start_with(document, |_| {}).await
    }

    /// Like `start`, with a chance to adjust the settings first.
    pub async fn start_with(document: ServiceMap, adjust: impl FnOnce(&mut GatewayConfig)) -> Self {
        let (dir, store) = temp_store(&document);
        let mut config = test_config(store.path().to_path_buf());
        adjust(&mut config);

        let router = ServiceRouter::load(store, BackendDialer::new(config.upstream.clone()))
            .expect("Failed to load registry");
        let server = GatewayServer::bind(&config, router)
            .await
            .expect("Failed to bind gateway");

        let proxy_addr = server.proxy_addr();
        let admin_addr = server.admin_addr();
        let router = server.router();
        let handle = server.handle();

        let task = tokio::spawn(async move {
            let _ = server.run().await;
        });

        assert!(wait_for_server(proxy_addr, Duration::from_secs(2)).await);
        assert!(wait_for_server(admin_addr, Duration::from_secs(2)).await);

        Self {
            proxy_addr,
            admin_addr,
            router,
            handle,
            task,
            dir,
        }
    }

    pub fn proxy_url(&self, path: &str) -> String {
        format!("http://{}{}", self.proxy_addr, path)
    }

    pub fn admin_url(&self, path: &str) -> String {
        format!("http://{}{}", self.admin_addr, path)
    }

    pub fn services_file(&self) -> PathBuf {
        self.dir.path().join("proxy_config.json")
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}
