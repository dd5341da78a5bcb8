//! Forwarding of one resolved request to its backend.

use std::net::SocketAddr;

use axum::body::{Body, HttpBody};
use axum::http::header::{HeaderName, CONNECTION, HOST};
use axum::http::{HeaderMap, HeaderValue, Request, Response};
use tokio::time::timeout;

use crate::backend::Dispatch;
use crate::proxy::error::ProxyError;

pub const X_PROXY_SERVICE: &str = "x-proxy-service";
pub const X_PROXY_ENV: &str = "x-proxy-env";
pub const X_PROXY_TIME: &str = "x-proxy-time";
pub const X_REQUEST_ID: &str = "x-request-id";

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Headers that describe a single connection and must not be relayed.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Per-request facts that do not come from the registry.
#[derive(Debug, Clone)]
pub struct ForwardContext {
    pub request_id: String,
    pub client_addr: Option<SocketAddr>,
}

/// Forward `req` to the client chosen in `dispatch`.
///
/// Both bodies are relayed as streams: upload chunks reach the backend as the
/// client sends them, and event streams or slow downloads flow back as the
/// backend produces them. Dropping this future or the returned response
/// aborts the upstream exchange.
pub async fn forward(
    req: Request<Body>,
    dispatch: Dispatch,
    ctx: &ForwardContext,
) -> Result<Response<Body>, ProxyError> {
    let (parts, body) = req.into_parts();

    let path_and_query = match parts.uri.query() {
        Some(query) => format!("{}?{}", dispatch.path, query),
        None => dispatch.path.clone(),
    };
    let upstream_uri = dispatch.client.upstream_url(&path_and_query);

    let mut headers = parts.headers;
    let original_host = headers.remove(HOST);
    strip_hop_by_hop(&mut headers);
    set_forwarded_headers(&mut headers, original_host, ctx.client_addr);
    set_diagnostic_headers(&mut headers, &dispatch, &ctx.request_id)?;

    tracing::debug!(
        request_id = %ctx.request_id,
        service = %dispatch.service_id,
        env = %dispatch.env,
        matched = dispatch.matched.as_str(),
        method = %parts.method,
        upstream = %upstream_uri,
        "Forwarding request"
    );

    let mut builder = dispatch
        .client
        .http()
        .request(parts.method, upstream_uri)
        .headers(headers);
    if !body.is_end_stream() {
        builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let header_timeout = dispatch.client.header_timeout();
    let upstream_resp = match timeout(header_timeout, builder.send()).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            return Err(ProxyError::ConnectionError {
                service: dispatch.service_id.clone(),
                env: dispatch.env,
                target: dispatch.client.target().to_string(),
                source: e,
            })
        }
        Err(_) => {
            return Err(ProxyError::HeaderTimeout {
                service: dispatch.service_id.clone(),
                env: dispatch.env,
                duration: header_timeout.as_secs(),
            })
        }
    };

    let status = upstream_resp.status();
    let mut response_headers = upstream_resp.headers().clone();
    strip_hop_by_hop(&mut response_headers);

    let mut response_builder = Response::builder().status(status);
    if let Some(headers) = response_builder.headers_mut() {
        headers.extend(response_headers);
        if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
            headers.insert(X_REQUEST_ID, value);
        }
    }

    let stream = upstream_resp.bytes_stream();
    Ok(response_builder.body(Body::from_stream(stream))?)
}

/// Remove the fixed hop-by-hop headers and any header named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn set_forwarded_headers(
    headers: &mut HeaderMap,
    original_host: Option<HeaderValue>,
    client_addr: Option<SocketAddr>,
) {
    if let Some(addr) = client_addr {
        let ip = addr.ip().to_string();
        let chain = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.trim().is_empty() => format!("{existing}, {ip}"),
            _ => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if let Some(host) = original_host {
        if !headers.contains_key(X_FORWARDED_HOST) {
            headers.insert(X_FORWARDED_HOST, host);
        }
    }
    if !headers.contains_key(X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    }
}

fn set_diagnostic_headers(
    headers: &mut HeaderMap,
    dispatch: &Dispatch,
    request_id: &str,
) -> Result<(), ProxyError> {
    let time = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

    headers.insert(X_PROXY_SERVICE, header_value(&dispatch.service_id)?);
    headers.insert(X_PROXY_ENV, HeaderValue::from_static(dispatch.env.as_str()));
    headers.insert(X_PROXY_TIME, header_value(&time)?);
    headers.insert(X_REQUEST_ID, header_value(request_id)?);
    Ok(())
}

fn header_value(value: &str) -> Result<HeaderValue, ProxyError> {
    HeaderValue::from_str(value).map_err(|e| ProxyError::Http(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fixed_and_connection_named_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive, x-secret"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("x-secret", HeaderValue::from_static("1"));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("content-type"));
    }

    #[test]
    fn forwarded_for_appends_client_ip() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("10.0.0.1"));
        let addr: SocketAddr = "192.168.1.7:5555".parse().unwrap();

        set_forwarded_headers(
            &mut headers,
            Some(HeaderValue::from_static("gateway.local:8000")),
            Some(addr),
        );

        assert_eq!(headers[X_FORWARDED_FOR], "10.0.0.1, 192.168.1.7");
        assert_eq!(headers[X_FORWARDED_HOST], "gateway.local:8000");
        assert_eq!(headers[X_FORWARDED_PROTO], "http");
    }

    #[test]
    fn forwarded_for_without_client_addr_is_untouched() {
        let mut headers = HeaderMap::new();
        set_forwarded_headers(&mut headers, None, None);
        assert!(!headers.contains_key(X_FORWARDED_FOR));
        assert!(!headers.contains_key(X_FORWARDED_HOST));
    }
}
