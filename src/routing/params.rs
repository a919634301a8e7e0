//! Routing-parameter extraction.
//!
//! # Responsibilities
//! - Derive topology key, version bounds and service name for a request
//! - Read override headers first, fall back to hostname segments
//!
//! # Hostname Convention
//! ```text
//! [t-<topology>.][<min>.][<max>.]<service>[.<rest>]
//! e.g. t-blue.1-0-0.2-0-0.search.example.com
//! ```
//!
//! # Design Decisions
//! - Segments are consumed left to right, each only if it has the right shape
//! - A header that supplies a field never consumes a hostname segment
//! - An unparseable version header counts as absent
//! - Host matching is case-insensitive; the port is ignored

use axum::http::uri::Authority;
use axum::http::HeaderMap;

use crate::routing::version::{parse_version, Constraint, Version};

pub const TOPOLOGY_HEADER: &str = "x-byway-topology";
pub const MIN_VERSION_HEADER: &str = "x-byway-min";
pub const MAX_VERSION_HEADER: &str = "x-byway-max";
pub const SERVICE_HEADER: &str = "x-byway-service";

/// Prefix marking a topology segment in the hostname.
pub const TOPOLOGY_PREFIX: &str = "t-";

/// Parameters that select a binding for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingParams {
    pub topology: Option<String>,
    pub min: Option<Version>,
    pub max: Option<Version>,
    pub service: Option<String>,
}

impl RoutingParams {
    /// Extract parameters from a request host and its headers.
    pub fn extract(host: &str, headers: &HeaderMap) -> Self {
        let host = strip_port(host).to_ascii_lowercase();
        let mut segments = Segments::new(&host);

        let topology = match header_value(headers, TOPOLOGY_HEADER) {
            Some(topology) => Some(topology.to_string()),
            None => segments.take_if(|segment| {
                segment
                    .strip_prefix(TOPOLOGY_PREFIX)
                    .filter(|key| !key.is_empty())
                    .map(str::to_string)
            }),
        };

        let min = header_version(headers, MIN_VERSION_HEADER)
            .or_else(|| segments.take_if(parse_version));
        let max = header_version(headers, MAX_VERSION_HEADER)
            .or_else(|| segments.take_if(parse_version));

        let service = match header_value(headers, SERVICE_HEADER) {
            Some(service) => Some(service.to_string()),
            None => segments.take().map(str::to_string),
        };

        let params = Self {
            topology,
            min,
            max,
            service,
        };
        tracing::debug!(
            host = %host,
            topology = ?params.topology,
            min = ?params.min.as_ref().map(ToString::to_string),
            max = ?params.max.as_ref().map(ToString::to_string),
            service = ?params.service,
            "Routing parameters extracted"
        );
        params
    }

    /// The version constraint implied by the min/max bounds.
    pub fn constraint(&self) -> Constraint {
        Constraint::new(self.min.clone(), self.max.clone())
    }
}

/// Left-to-right cursor over non-empty hostname labels.
struct Segments<'a> {
    labels: Vec<&'a str>,
    position: usize,
}

impl<'a> Segments<'a> {
    fn new(host: &'a str) -> Self {
        Self {
            labels: host.split('.').collect(),
            position: 0,
        }
    }

    /// Consume the next label only if `f` accepts it.
    fn take_if<T>(&mut self, f: impl FnOnce(&'a str) -> Option<T>) -> Option<T> {
        let label = self.labels.get(self.position).copied()?;
        let value = f(label)?;
        self.position += 1;
        Some(value)
    }

    fn take(&mut self) -> Option<&'a str> {
        let label = self.labels.get(self.position).copied()?;
        self.position += 1;
        Some(label).filter(|label| !label.is_empty())
    }
}

fn header_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn header_version(headers: &HeaderMap, name: &str) -> Option<Version> {
    header_value(headers, name).and_then(parse_version)
}

fn strip_port(host: &str) -> &str {
    match host.parse::<Authority>() {
        Ok(authority) if authority.port().is_some() => {
            let end = authority.host().len();
            &host[..end]
        }
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for &(name, value) in pairs {
            map.insert(name, HeaderValue::from_static(value));
        }
        map
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_full_hostname_convention() {
        let params = RoutingParams::extract("t-blue.1-0-0.2-0-0.search.example.com", &HeaderMap::new());
        assert_eq!(params.topology.as_deref(), Some("blue"));
        assert_eq!(params.min, Some(v("1.0.0")));
        assert_eq!(params.max, Some(v("2.0.0")));
        assert_eq!(params.service.as_deref(), Some("search"));
    }

    #[test]
    fn test_service_only() {
        let params = RoutingParams::extract("search.internal", &HeaderMap::new());
        assert_eq!(params.topology, None);
        assert_eq!(params.min, None);
        assert_eq!(params.max, None);
        assert_eq!(params.service.as_deref(), Some("search"));
    }

    #[test]
    fn test_min_only_from_host() {
        let params = RoutingParams::extract("1-0-1.echo.example.com:8080", &HeaderMap::new());
        assert_eq!(params.min, Some(v("1.0.1")));
        assert_eq!(params.max, None);
        assert_eq!(params.service.as_deref(), Some("echo"));
    }

    #[test]
    fn test_headers_win_without_consuming() {
        let map = headers(&[(MIN_VERSION_HEADER, "2.0.0"), (MAX_VERSION_HEADER, "3-5-0")]);
        let params = RoutingParams::extract("search.internal", &map);
        assert_eq!(params.min, Some(v("2.0.0")));
        assert_eq!(params.max, Some(v("3.5.0")));
        assert_eq!(params.service.as_deref(), Some("search"));
    }

    #[test]
    fn test_service_header_overrides_host() {
        let map = headers(&[(SERVICE_HEADER, "search")]);
        let params = RoutingParams::extract("1-0-0.echo.example.com", &map);
        assert_eq!(params.service.as_deref(), Some("search"));
        assert_eq!(params.min, Some(v("1.0.0")));
    }

    #[test]
    fn test_topology_header_leaves_prefixed_segment() {
        let map = headers(&[(TOPOLOGY_HEADER, "green")]);
        let params = RoutingParams::extract("t-blue.search.example.com", &map);
        assert_eq!(params.topology.as_deref(), Some("green"));
        // The unconsumed `t-blue` label is now the service position.
        assert_eq!(params.service.as_deref(), Some("t-blue"));
    }

    #[test]
    fn test_invalid_version_header_falls_back_to_host() {
        let map = headers(&[(MIN_VERSION_HEADER, "latest")]);
        let params = RoutingParams::extract("1-2-0.search", &map);
        assert_eq!(params.min, Some(v("1.2.0")));
        assert_eq!(params.service.as_deref(), Some("search"));
    }

    #[test]
    fn test_hostname_runs_out() {
        let params = RoutingParams::extract("1-0-0", &HeaderMap::new());
        assert_eq!(params.min, Some(v("1.0.0")));
        assert_eq!(params.service, None);

        let params = RoutingParams::extract("", &HeaderMap::new());
        assert_eq!(params.service, None);
    }

    #[test]
    fn test_host_is_case_insensitive() {
        let params = RoutingParams::extract("T-Blue.Search.Example.com", &HeaderMap::new());
        assert_eq!(params.topology.as_deref(), Some("blue"));
        assert_eq!(params.service.as_deref(), Some("search"));
    }

    #[test]
    fn test_constraint_from_params() {
        let params = RoutingParams::extract("2-0-0.search", &HeaderMap::new());
        let constraint = params.constraint();
        assert!(constraint.matches(&v("4.0.0")));
        assert!(!constraint.matches(&v("1.0.0")));
    }
}
