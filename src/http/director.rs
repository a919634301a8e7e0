//! Proxy director.
//!
//! Turns an inbound request into an upstream request, in place:
//!
//! ```text
//! inbound host + path ─→ rewrite chain ─→ routing params ─→ resolve
//!                                                            │
//!        ┌───────────────── binding ─────────────────────────┤
//!        ▼                                                   ▼ none
//! rewrite again, X-Forwarded-Host,                 passthrough: original
//! path rewrite, scheme/host/Host from binding      host and URI (or reject)
//! ```
//!
//! The table is loaded once per request; a concurrent publish never changes
//! the table a request is being directed with.
//!
//! Rewrites operate on the parsed URL, so once a table has rewrite rules the
//! forwarded path is normalized (dot-segments resolved, unsafe characters
//! percent-encoded). With no rules the path and query are forwarded as sent.

use std::sync::Arc;

use axum::http::header::{HOST, InvalidHeaderValue};
use axum::http::request::Parts;
use axum::http::uri::InvalidUri;
use axum::http::{HeaderName, HeaderValue, StatusCode, Uri};
use thiserror::Error;
use url::Url;

use crate::config::UnroutedPolicy;
use crate::observability::metrics;
use crate::routing::{Resolution, RewriteError, RoutingParams, RoutingSnapshot};

pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Request-scoped routing failures.
#[derive(Debug, Error)]
pub enum DirectorError {
    #[error("request has no host")]
    MissingHost,

    #[error("invalid request url '{url}': {source}")]
    InvalidRequest {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error("no binding for host '{host}'")]
    Unrouted { host: String },

    #[error("upstream uri '{uri}' is invalid: {source}")]
    InvalidUpstream {
        uri: String,
        #[source]
        source: InvalidUri,
    },

    #[error("invalid forwarded header: {0}")]
    Header(#[from] InvalidHeaderValue),
}

impl DirectorError {
    /// Status returned to the client for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            DirectorError::MissingHost | DirectorError::InvalidRequest { .. } => {
                StatusCode::BAD_REQUEST
            }
            DirectorError::Rewrite(
                RewriteError::Cycle { .. }
                | RewriteError::TooManyPasses { .. }
                | RewriteError::TooLong { .. },
            ) => StatusCode::LOOP_DETECTED,
            DirectorError::Unrouted { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// What the director decided for one request.
#[derive(Debug, Clone)]
pub enum Directed {
    Routed(Resolution),
    Passthrough,
}

impl Directed {
    pub fn outcome(&self) -> &'static str {
        match self {
            Directed::Routed(_) => "routed",
            Directed::Passthrough => "unrouted",
        }
    }
}

/// Per-request routing against the active snapshot.
#[derive(Debug, Clone)]
pub struct Director {
    snapshot: Arc<RoutingSnapshot>,
    unrouted: UnroutedPolicy,
}

impl Director {
    pub fn new(snapshot: Arc<RoutingSnapshot>, unrouted: UnroutedPolicy) -> Self {
        Self { snapshot, unrouted }
    }

    /// Rewrite `parts` so that its URI is absolute and points upstream.
    pub fn direct(&self, parts: &mut Parts) -> Result<Directed, DirectorError> {
        let table = self.snapshot.load();
        let inbound_host = inbound_host(parts)?;
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .to_string();

        let raw_url = format!("http://{inbound_host}{path_and_query}");
        let working = Url::parse(&raw_url).map_err(|source| DirectorError::InvalidRequest {
            url: raw_url.clone(),
            source,
        })?;
        let working = table.rewrites().rewrite_url(&working)?;

        let params = RoutingParams::extract(working.host_str().unwrap_or(""), &parts.headers);
        let Some(resolution) = table.resolve(&params) else {
            return self.unrouted(parts, inbound_host, path_and_query);
        };

        let working = table.rewrites().rewrite_url(&working)?;
        let binding = &resolution.binding;

        let (path, query) = if table.rewrites().is_empty() {
            match path_and_query.split_once('?') {
                Some((path, query)) => (path, Some(query)),
                None => (path_and_query.as_str(), None),
            }
        } else {
            (working.path(), working.query())
        };
        let path = binding.path_rewrite().apply(path);
        let upstream = match query {
            Some(query) => format!("{}://{}{}?{}", binding.scheme(), binding.host(), path, query),
            None => format!("{}://{}{}", binding.scheme(), binding.host(), path),
        };
        parts.uri = upstream
            .parse::<Uri>()
            .map_err(|source| DirectorError::InvalidUpstream {
                uri: upstream.clone(),
                source,
            })?;

        parts
            .headers
            .append(X_FORWARDED_HOST, HeaderValue::from_str(&inbound_host)?);
        parts.headers.insert(HOST, binding.host_header().clone());
        for (name, value) in binding.headers() {
            parts.headers.insert(name.clone(), value.clone());
        }

        metrics::record_resolution(&resolution.service, resolution.resolved_by.as_str());
        tracing::debug!(
            service = %resolution.service,
            version = %resolution.version,
            via = resolution.resolved_by.as_str(),
            upstream = %parts.uri,
            "Request routed"
        );
        Ok(Directed::Routed(resolution))
    }

    fn unrouted(
        &self,
        parts: &mut Parts,
        inbound_host: String,
        path_and_query: String,
    ) -> Result<Directed, DirectorError> {
        match self.unrouted {
            UnroutedPolicy::Reject => {
                tracing::debug!(host = %inbound_host, "No binding, rejecting");
                Err(DirectorError::Unrouted { host: inbound_host })
            }
            UnroutedPolicy::Passthrough => {
                let original = format!("http://{inbound_host}{path_and_query}");
                parts.uri = original
                    .parse::<Uri>()
                    .map_err(|source| DirectorError::InvalidUpstream {
                        uri: original.clone(),
                        source,
                    })?;
                tracing::debug!(upstream = %parts.uri, "No binding, passing through");
                Ok(Directed::Passthrough)
            }
        }
    }
}

/// `Host` header first, then the authority of an absolute-form URI.
fn inbound_host(parts: &Parts) -> Result<String, DirectorError> {
    parts
        .headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|authority| authority.to_string()))
        .ok_or(DirectorError::MissingHost)
}
