//! Service resolution and path rewriting for inbound requests.
//!
//! Resolution order, first match wins:
//!
//! 1. `/api/<id>[/...]` with a known `<id>`: prefix `/api/<id>` becomes `/api`.
//! 2. `/<id>[/...]` with a known `<id>`: prefix `/<id>` is stripped.
//! 3. The `default` service, path untouched.
//! 4. Any remaining service chosen by the caller's fallback, path untouched.
//!
//! Segments are percent-decoded before they are compared with service ids,
//! so `/%62illing` selects `billing`. The rewrite itself strips the raw
//! (still encoded) prefix and leaves the rest of the path byte for byte.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;

use crate::config::DEFAULT_SERVICE_ID;

/// How a request was matched to its service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMatch {
    /// `/api/<id>/...`
    ApiPrefix,
    /// `/<id>/...`
    ServicePrefix,
    /// No prefix matched; the `default` service took it.
    Default,
    /// No prefix matched and there is no `default` service.
    Fallback,
}

impl RouteMatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteMatch::ApiPrefix => "api_prefix",
            RouteMatch::ServicePrefix => "service_prefix",
            RouteMatch::Default => "default",
            RouteMatch::Fallback => "fallback",
        }
    }
}

/// Result of resolving a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub service_id: String,
    pub matched: RouteMatch,
    /// Path to forward upstream (query string not included).
    pub path: String,
}

/// Resolve `path` to a service.
///
/// `is_known` answers whether an id is registered; `fallback` is asked for a
/// service only when neither a prefix nor `default` matched. Returns `None`
/// when nothing can serve the request.
pub fn resolve_route<F, G>(path: &str, is_known: F, fallback: G) -> Option<Route>
where
    F: Fn(&str) -> bool,
    G: FnOnce() -> Option<String>,
{
    let mut segments = path.strip_prefix('/').unwrap_or(path).split('/');
    let first_raw = segments.next().unwrap_or_default();
    let first = decode_segment(first_raw);

    if first.as_deref() == Some("api") {
        if let Some(id_raw) = segments.next() {
            if let Some(id) = decode_segment(id_raw).filter(|id| !id.is_empty() && is_known(id)) {
                let prefix = format!("/{first_raw}/{id_raw}");
                return Some(Route {
                    service_id: id.into_owned(),
                    matched: RouteMatch::ApiPrefix,
                    path: rewrite_path(path, &prefix, "/api"),
                });
            }
        }
    }

    if let Some(id) = first.filter(|id| !id.is_empty() && is_known(id)) {
        let prefix = format!("/{first_raw}");
        return Some(Route {
            service_id: id.into_owned(),
            matched: RouteMatch::ServicePrefix,
            path: rewrite_path(path, &prefix, ""),
        });
    }

    if is_known(DEFAULT_SERVICE_ID) {
        return Some(Route {
            service_id: DEFAULT_SERVICE_ID.to_string(),
            matched: RouteMatch::Default,
            path: path.to_string(),
        });
    }

    fallback().map(|service_id| Route {
        service_id,
        matched: RouteMatch::Fallback,
        path: path.to_string(),
    })
}

/// Percent-decode one path segment; `None` if it is not valid UTF-8.
fn decode_segment(raw: &str) -> Option<Cow<'_, str>> {
    percent_decode_str(raw).decode_utf8().ok()
}

/// Replace a whole-segment `prefix` of `path` with `replacement`.
///
/// The result always starts with `/`. A path that does not start with
/// `prefix` at a segment boundary is returned unchanged.
pub fn rewrite_path(path: &str, prefix: &str, replacement: &str) -> String {
    match path.strip_prefix(prefix) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            let rewritten = format!("{replacement}{rest}");
            if rewritten.starts_with('/') {
                rewritten
            } else {
                format!("/{rewritten}")
            }
        }
        _ => path.to_string(),
    }
}
