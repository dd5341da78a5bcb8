pub mod connection;
pub mod error;
pub mod router;
pub mod routing;
pub mod server;
pub mod shutdown;
pub mod tracing;
pub mod upstream;

pub use error::{ErrorResponse, ProxyError};
pub use router::{build_proxy_router, proxy_handler};
pub use server::{GatewayHandle, GatewayServer, ServerError};
pub use shutdown::ShutdownManager;
