use std::net::SocketAddr;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use uuid::Uuid;

use crate::backend::ServiceRouter;
use crate::proxy::error::{ErrorResponse, ProxyError};
use crate::proxy::upstream::{forward, ForwardContext, X_REQUEST_ID};

/// Upper bound for a client-supplied request id to be reused.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Data-plane router: every method and path goes to `proxy_handler`.
pub fn build_proxy_router(router: ServiceRouter) -> Router {
    Router::new().fallback(proxy_handler).with_state(router)
}

/// Resolve, forward, and turn any failure into a JSON error response.
pub async fn proxy_handler(State(router): State<ServiceRouter>, req: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(&req);
    let client_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let Some(dispatch) = router.resolve(&path) else {
        tracing::warn!(request_id = %request_id, path = %path, "No service configured");
        return ErrorResponse::from_error(&ProxyError::NoServiceConfigured, &request_id);
    };
    let service = dispatch.service_id.clone();
    let env = dispatch.env;

    let ctx = ForwardContext {
        request_id: request_id.clone(),
        client_addr,
    };

    match forward(req, dispatch, &ctx).await {
        Ok(response) => {
            tracing::info!(
                request_id = %request_id,
                method = %method,
                path = %path,
                service = %service,
                env = %env,
                status = response.status().as_u16(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Request forwarded"
            );
            response
        }
        Err(err) => {
            tracing::warn!(
                request_id = %request_id,
                method = %method,
                path = %path,
                service = %service,
                env = %env,
                error = %err,
                "Forwarding failed"
            );
            ErrorResponse::from_error(&err, &request_id)
        }
    }
}

fn request_id(req: &Request<Body>) -> String {
    req.headers()
        .get(X_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
