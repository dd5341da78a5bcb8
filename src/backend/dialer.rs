//! Outbound forwarding clients, one per backend target.

use std::time::Duration;

use reqwest::{Client, Url};
use thiserror::Error;

use crate::config::UpstreamConfig;

const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

/// Errors that can occur while building a forwarding client.
#[derive(Debug, Error)]
pub enum DialError {
    /// The target is not an absolute http(s) URL.
    #[error("Invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// The HTTP client itself could not be constructed.
    #[error("Failed to build client for '{target}': {source}")]
    Client {
        target: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Builds forwarding clients that share one timeout and pooling policy.
#[derive(Debug, Clone)]
pub struct BackendDialer {
    config: UpstreamConfig,
}

impl BackendDialer {
    pub fn new(config: UpstreamConfig) -> Self {
        Self { config }
    }

    /// Build a pooled client bound to `target`.
    ///
    /// The client keeps idle connections for reuse, never follows redirects
    /// and leaves bodies encoded as the backend sent them. Only the wait for
    /// response headers is bounded; body transfer is not, so long-lived
    /// streams stay open.
    pub fn build(&self, target: &str) -> Result<ForwardingClient, DialError> {
        let url = parse_target(target)?;

        let client = Client::builder()
            .connect_timeout(self.config.connect_timeout())
            .pool_idle_timeout(self.config.pool_idle_timeout())
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host as usize)
            .tcp_keepalive(TCP_KEEPALIVE)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .map_err(|e| DialError::Client {
                target: target.to_string(),
                source: e,
            })?;

        let mut base = url.clone();
        base.set_query(None);
        base.set_fragment(None);
        let base = base.as_str().trim_end_matches('/').to_string();

        Ok(ForwardingClient {
            target: url,
            base,
            client,
            header_timeout: self.config.response_header_timeout(),
        })
    }
}

impl Default for BackendDialer {
    fn default() -> Self {
        Self::new(UpstreamConfig::default())
    }
}

/// A connection-pooled HTTP client bound to one backend target.
#[derive(Debug)]
pub struct ForwardingClient {
    target: Url,
    /// Target without query, fragment or trailing slash.
    base: String,
    client: Client,
    header_timeout: Duration,
}

impl ForwardingClient {
    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn http(&self) -> &Client {
        &self.client
    }

    pub fn header_timeout(&self) -> Duration {
        self.header_timeout
    }

    /// Full upstream URL for a forwarded `path_and_query`.
    ///
    /// A path on the target acts as a base: `http://h/base` with `/x?y`
    /// yields `http://h/base/x?y`.
    pub fn upstream_url(&self, path_and_query: &str) -> String {
        if path_and_query.starts_with('/') {
            format!("{}{}", self.base, path_and_query)
        } else {
            format!("{}/{}", self.base, path_and_query)
        }
    }
}

/// Parse and check a backend target URL.
pub fn parse_target(target: &str) -> Result<Url, DialError> {
    let invalid = |reason: String| DialError::InvalidTarget {
        target: target.to_string(),
        reason,
    };

    if target.trim().is_empty() {
        return Err(invalid("target is empty".to_string()));
    }

    let url = Url::parse(target).map_err(|e| invalid(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }

    Ok(url)
}
