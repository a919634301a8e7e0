//! Upstream forwarding.
//!
//! # Responsibilities
//! - Send a directed request to its upstream and stream the response back
//! - Strip hop-by-hop headers in both directions
//!
//! # Design Decisions
//! - Plain `http` upstreams go through a pooled hyper client (HTTP/1.1)
//! - `https` upstreams go through reqwest, which brings TLS
//! - Redirects are returned to the client, never followed
//! - No retries; a failed upstream is a 502

use std::time::Duration;

use axum::body::Body;
use axum::http::header::{
    CONNECTION, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
};
use axum::http::{HeaderMap, HeaderName, Request, Response, Version};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

use crate::config::TimeoutConfig;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("upstream request failed: {0}")]
    Http(#[from] hyper_util::client::legacy::Error),

    #[error("upstream request failed: {0}")]
    Https(#[from] reqwest::Error),

    #[error("failed to build https client: {0}")]
    Build(reqwest::Error),
}

const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

/// Remove connection-scoped headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }

    for name in [
        CONNECTION,
        KEEP_ALIVE,
        PROXY_AUTHENTICATE,
        PROXY_AUTHORIZATION,
        TE,
        TRAILER,
        TRANSFER_ENCODING,
        UPGRADE,
    ] {
        headers.remove(name);
    }
}

/// Client side of the gateway.
#[derive(Clone)]
pub struct Transport {
    http: Client<HttpConnector, Body>,
    https: reqwest::Client,
}

impl Transport {
    pub fn new(timeouts: &TimeoutConfig) -> Result<Self, TransportError> {
        let connect_timeout = Duration::from_secs(timeouts.connect_secs);

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let http = Client::builder(TokioExecutor::new()).build(connector);

        let https = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(TransportError::Build)?;

        Ok(Self { http, https })
    }

    /// Forward `request`, whose URI must already be absolute.
    pub async fn forward(&self, mut request: Request<Body>) -> Result<Response<Body>, TransportError> {
        strip_hop_by_hop(request.headers_mut());

        let mut response = match request.uri().scheme_str() {
            Some("https") => self.forward_https(request).await?,
            _ => self.forward_http(request).await?,
        };
        strip_hop_by_hop(response.headers_mut());
        Ok(response)
    }

    async fn forward_http(&self, mut request: Request<Body>) -> Result<Response<Body>, TransportError> {
        *request.version_mut() = Version::HTTP_11;
        let response: Response<hyper::body::Incoming> = self.http.request(request).await?;
        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }

    async fn forward_https(&self, request: Request<Body>) -> Result<Response<Body>, TransportError> {
        let (parts, body) = request.into_parts();
        let upstream = self
            .https
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()))
            .send()
            .await?;

        let status = upstream.status();
        let headers = upstream.headers().clone();
        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, x-session"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-session", HeaderValue::from_static("abc"));
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert("x-request-id", HeaderValue::from_static("42"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers["x-request-id"], "42");
    }
}
