//! Routing table: wire format, compilation and binding resolution.
//!
//! # Data Flow
//! ```text
//! RawRoutingTable (YAML / TOML / JSON / redis)
//!     → RoutingTable::compile (regexes built, versions parsed, defaults applied)
//!     → RoutingTable (immutable, shared via Arc)
//!     → resolve(RoutingParams) → Resolution
//! ```
//!
//! # Compile Contract
//! - Every rewrite rule must be `<pattern>;<replacement>` with a valid regex
//! - Every version key must parse; two keys may not denote the same version
//! - `scheme` defaults to `http`; only `http` and `https` are accepted
//! - `rewrite` on an endpoint becomes its path rewrite; absent means identity
//! - `headers` names and values must be valid HTTP headers; `host` is kept
//!   apart and becomes the outgoing `Host`
//! - The topology table is always present, possibly empty
//!
//! Compilation is pure: it shares nothing with previously compiled tables.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use axum::http::header::HOST;
use axum::http::uri::Authority;
use axum::http::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::params::RoutingParams;
use crate::routing::rewrite::{Rewrite, RewriteChain, RewriteError};
use crate::routing::topology::TopologyTable;
use crate::routing::version::{Constraint, Version, VersionError};

/// Routing table as produced by a config source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRoutingTable {
    /// Ordered `<pattern>;<replacement>` rules.
    pub rewrites: Vec<String>,

    /// Service name → version string → endpoint.
    pub services: BTreeMap<String, BTreeMap<String, EndpointConfig>>,

    /// Topology key → service name → pinned version string.
    pub topologies: BTreeMap<String, BTreeMap<String, String>>,
}

/// Endpoint descriptor for one service version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Upstream authority, e.g. `localhost:8081`.
    pub host: String,

    /// `http` (default) or `https`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,

    /// Optional `<pattern>;<replacement>` applied to the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<String>,

    /// Headers set on the forwarded request; `host` overrides the `Host` header.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl EndpointConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_rewrite(mut self, rule: impl Into<String>) -> Self {
        self.rewrite = Some(rule.into());
        self
    }
}

/// Errors from editing a raw table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableEditError {
    #[error("no rewrite at index {index} (table has {len})")]
    RewriteIndexOutOfRange { index: usize, len: usize },

    #[error("rewrite at index {index} is '{found}', not '{expected}'")]
    RewriteMismatch {
        index: usize,
        expected: String,
        found: String,
    },
}

impl RawRoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_rewrite(&mut self, rule: impl Into<String>) {
        self.rewrites.push(rule.into());
    }

    /// Remove the rewrite at `index`, but only if it is exactly `rule`.
    pub fn remove_rewrite(&mut self, index: usize, rule: &str) -> Result<String, TableEditError> {
        let found = self
            .rewrites
            .get(index)
            .ok_or(TableEditError::RewriteIndexOutOfRange {
                index,
                len: self.rewrites.len(),
            })?;

        if found != rule {
            return Err(TableEditError::RewriteMismatch {
                index,
                expected: rule.to_string(),
                found: found.clone(),
            });
        }
        Ok(self.rewrites.remove(index))
    }

    /// Register an empty service. Returns `false` if it already existed.
    pub fn add_service(&mut self, service: impl Into<String>) -> bool {
        let service = service.into();
        if self.services.contains_key(&service) {
            return false;
        }
        self.services.insert(service, BTreeMap::new());
        true
    }

    /// Bind `service@version` to an endpoint, registering the service if needed.
    pub fn set_binding(
        &mut self,
        service: impl Into<String>,
        version: impl Into<String>,
        endpoint: EndpointConfig,
    ) {
        self.services
            .entry(service.into())
            .or_default()
            .insert(version.into(), endpoint);
    }

    /// Pin `service` to `version` within `topology`.
    pub fn pin(
        &mut self,
        topology: impl Into<String>,
        service: impl Into<String>,
        version: impl Into<String>,
    ) {
        self.topologies
            .entry(topology.into())
            .or_default()
            .insert(service.into(), version.into());
    }
}

/// Errors that reject a routing table at compile time.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("rewrite #{index}: {source}")]
    Rewrite {
        index: usize,
        #[source]
        source: RewriteError,
    },

    #[error("service '{service}': invalid version key '{version}': {source}")]
    Version {
        service: String,
        version: String,
        #[source]
        source: VersionError,
    },

    #[error("service '{service}': version keys '{first}' and '{second}' are the same version")]
    DuplicateVersion {
        service: String,
        first: String,
        second: String,
    },

    #[error("service '{service}@{version}': invalid host '{host}'")]
    Host {
        service: String,
        version: String,
        host: String,
    },

    #[error("service '{service}@{version}': unsupported scheme '{scheme}'")]
    Scheme {
        service: String,
        version: String,
        scheme: String,
    },

    #[error("service '{service}@{version}': invalid header '{name}': {reason}")]
    Header {
        service: String,
        version: String,
        name: String,
        reason: String,
    },

    #[error("service '{service}@{version}': invalid path rewrite: {source}")]
    PathRewrite {
        service: String,
        version: String,
        #[source]
        source: RewriteError,
    },
}

/// Upstream scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    fn parse(value: Option<&str>) -> Option<Self> {
        match value.map(str::trim).filter(|s| !s.is_empty()) {
            None => Some(Scheme::Http),
            Some(s) if s.eq_ignore_ascii_case("http") => Some(Scheme::Http),
            Some(s) if s.eq_ignore_ascii_case("https") => Some(Scheme::Https),
            Some(_) => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rewrite applied to the request path once a binding is chosen.
#[derive(Debug, Clone, Default)]
pub enum PathRewrite {
    #[default]
    Identity,
    Rule(Rewrite),
}

impl PathRewrite {
    pub fn apply<'a>(&self, path: &'a str) -> Cow<'a, str> {
        match self {
            PathRewrite::Identity => Cow::Borrowed(path),
            PathRewrite::Rule(rewrite) => rewrite.apply(path),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, PathRewrite::Identity)
    }
}

/// A compiled endpoint: where and how to forward a request.
#[derive(Debug, Clone)]
pub struct Binding {
    host: String,
    scheme: Scheme,
    host_header: HeaderValue,
    headers: Vec<(HeaderName, HeaderValue)>,
    path_rewrite: PathRewrite,
    endpoint: EndpointConfig,
}

impl Binding {
    fn compile(service: &str, version: &str, endpoint: &EndpointConfig) -> Result<Self, CompileError> {
        let host = endpoint.host.trim();
        if host.is_empty() || host.parse::<Authority>().is_err() {
            return Err(CompileError::Host {
                service: service.to_string(),
                version: version.to_string(),
                host: endpoint.host.clone(),
            });
        }

        let scheme = Scheme::parse(endpoint.scheme.as_deref()).ok_or_else(|| CompileError::Scheme {
            service: service.to_string(),
            version: version.to_string(),
            scheme: endpoint.scheme.clone().unwrap_or_default(),
        })?;

        let header_error = |name: &str, reason: String| CompileError::Header {
            service: service.to_string(),
            version: version.to_string(),
            name: name.to_string(),
            reason,
        };

        let mut host_header = None;
        let mut headers = Vec::with_capacity(endpoint.headers.len());
        for (name, value) in &endpoint.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| header_error(name, e.to_string()))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| header_error(name, e.to_string()))?;

            if header_name == HOST {
                host_header = Some(header_value);
            } else {
                headers.push((header_name, header_value));
            }
        }

        let host_header = match host_header {
            Some(value) => value,
            None => HeaderValue::from_str(host).map_err(|e| header_error("host", e.to_string()))?,
        };

        let path_rewrite = match endpoint.rewrite.as_deref().map(str::trim) {
            None | Some("") => PathRewrite::Identity,
            Some(rule) => PathRewrite::Rule(Rewrite::parse(rule).map_err(|source| {
                CompileError::PathRewrite {
                    service: service.to_string(),
                    version: version.to_string(),
                    source,
                }
            })?),
        };

        Ok(Self {
            host: host.to_string(),
            scheme,
            host_header,
            headers,
            path_rewrite,
            endpoint: endpoint.clone(),
        })
    }

    /// Upstream authority.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Value for the outgoing `Host` header.
    pub fn host_header(&self) -> &HeaderValue {
        &self.host_header
    }

    /// Extra headers set on the forwarded request (never `Host`).
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    pub fn path_rewrite(&self) -> &PathRewrite {
        &self.path_rewrite
    }

    /// The descriptor this binding was compiled from.
    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }
}

/// One entry of a service's version table.
#[derive(Debug, Clone)]
pub struct VersionedBinding {
    pub version: Version,
    /// Version string as written in the table.
    pub key: String,
    pub binding: Arc<Binding>,
}

/// A service's bindings, sorted by ascending version.
#[derive(Debug, Clone, Default)]
pub struct VersionTable {
    entries: Vec<VersionedBinding>,
}

impl VersionTable {
    pub(crate) fn compile(service: &str, raw: &BTreeMap<String, EndpointConfig>) -> Result<Self, CompileError> {
        let mut entries = Vec::with_capacity(raw.len());
        for (key, endpoint) in raw {
            let version = Version::parse(key).map_err(|source| CompileError::Version {
                service: service.to_string(),
                version: key.clone(),
                source,
            })?;
            let binding = Binding::compile(service, key, endpoint)?;
            entries.push(VersionedBinding {
                version,
                key: key.clone(),
                binding: Arc::new(binding),
            });
        }

        entries.sort_by(|a, b| a.version.cmp(&b.version));
        if let Some(pair) = entries.windows(2).find(|pair| pair[0].version == pair[1].version) {
            return Err(CompileError::DuplicateVersion {
                service: service.to_string(),
                first: pair[0].key.clone(),
                second: pair[1].key.clone(),
            });
        }

        Ok(Self { entries })
    }

    /// Highest version satisfying `constraint`.
    pub fn highest_matching(&self, constraint: &Constraint) -> Option<&VersionedBinding> {
        self.entries
            .iter()
            .rev()
            .find(|entry| constraint.matches(&entry.version))
    }

    /// Entry for a pinned version string: exact key first, then by version.
    pub fn pinned(&self, key: &str) -> Option<&VersionedBinding> {
        self.entries.iter().find(|entry| entry.key == key).or_else(|| {
            let version = Version::parse(key).ok()?;
            self.entries.iter().find(|entry| entry.version == version)
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How a binding was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Topology,
    Constraint,
}

impl ResolvedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolvedBy::Topology => "topology",
            ResolvedBy::Constraint => "constraint",
        }
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub service: String,
    pub version: Version,
    pub binding: Arc<Binding>,
    pub resolved_by: ResolvedBy,
}

/// Compiled, immutable routing table.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    rewrites: RewriteChain,
    services: HashMap<String, VersionTable>,
    topologies: TopologyTable,
}

impl RoutingTable {
    /// A table that routes nothing. Active until the first update arrives.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile a raw table. See the module docs for the contract.
    pub fn compile(raw: &RawRoutingTable) -> Result<Self, CompileError> {
        let rules = raw
            .rewrites
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                Rewrite::parse(rule).map_err(|source| CompileError::Rewrite { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let services = raw
            .services
            .iter()
            .map(|(name, versions)| Ok((name.clone(), VersionTable::compile(name, versions)?)))
            .collect::<Result<HashMap<_, _>, CompileError>>()?;

        Ok(Self {
            rewrites: RewriteChain::new(rules),
            services,
            topologies: TopologyTable::from_raw(&raw.topologies),
        })
    }

    pub fn rewrites(&self) -> &RewriteChain {
        &self.rewrites
    }

    pub fn topologies(&self) -> &TopologyTable {
        &self.topologies
    }

    pub fn service(&self, name: &str) -> Option<&VersionTable> {
        self.services.get(name)
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Pick a binding for the given parameters.
    ///
    /// A topology pin wins outright. Otherwise the highest version within
    /// the request's constraint is chosen.
    pub fn resolve(&self, params: &RoutingParams) -> Option<Resolution> {
        let service = params.service.as_deref()?;

        if let Some(topology) = params.topology.as_deref() {
            if let Some(pinned) = self.topologies.resolve(topology, service) {
                let entry = self.services.get(service).and_then(|table| table.pinned(pinned));
                return match entry {
                    Some(entry) => {
                        tracing::debug!(topology, service, version = %entry.version, "Topology pin applied");
                        Some(Self::resolution(service, entry, ResolvedBy::Topology))
                    }
                    None => {
                        tracing::warn!(topology, service, pinned, "Topology pins a version with no binding");
                        None
                    }
                };
            }
        }

        let Some(table) = self.services.get(service) else {
            tracing::debug!(service, "No version table for service");
            return None;
        };

        let constraint = params.constraint();
        match table.highest_matching(&constraint) {
            Some(entry) => {
                tracing::debug!(service, constraint = %constraint, version = %entry.version, "Version accepted");
                Some(Self::resolution(service, entry, ResolvedBy::Constraint))
            }
            None => {
                tracing::debug!(service, constraint = %constraint, "No version satisfies constraint");
                None
            }
        }
    }

    fn resolution(service: &str, entry: &VersionedBinding, resolved_by: ResolvedBy) -> Resolution {
        Resolution {
            service: service.to_string(),
            version: entry.version.clone(),
            binding: entry.binding.clone(),
            resolved_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_table() -> RawRoutingTable {
        let mut raw = RawRoutingTable::new();
        raw.set_binding("search", "1.0.0", EndpointConfig::new("www.aol.com"));
        raw.set_binding("search", "2.0.0", EndpointConfig::new("www.yahoo.com"));
        raw.set_binding("search", "3.0.0", EndpointConfig::new("www.google.com"));
        raw.set_binding("search", "4.0.0", EndpointConfig::new("www.bing.com"));
        raw
    }

    fn params(service: &str, min: Option<&str>, max: Option<&str>) -> RoutingParams {
        RoutingParams {
            topology: None,
            min: min.map(|v| Version::parse(v).unwrap()),
            max: max.map(|v| Version::parse(v).unwrap()),
            service: Some(service.to_string()),
        }
    }

    #[test]
    fn test_highest_satisfying_version_wins() {
        let table = RoutingTable::compile(&search_table()).unwrap();

        let hit = table.resolve(&params("search", Some("2.0.0"), Some("3.5.0"))).unwrap();
        assert_eq!(hit.version, Version::new(3, 0, 0));
        assert_eq!(hit.binding.host(), "www.google.com");
        assert_eq!(hit.resolved_by, ResolvedBy::Constraint);

        let open = table.resolve(&params("search", None, None)).unwrap();
        assert_eq!(open.binding.host(), "www.bing.com");

        assert!(table.resolve(&params("search", Some("5.0.0"), None)).is_none());
    }

    #[test]
    fn test_topology_pin_overrides_constraint() {
        let mut raw = search_table();
        raw.pin("blue", "search", "2.0.0");
        let table = RoutingTable::compile(&raw).unwrap();

        let mut request = params("search", Some("4.0.0"), None);
        request.topology = Some("blue".to_string());
        let hit = table.resolve(&request).unwrap();
        assert_eq!(hit.version, Version::new(2, 0, 0));
        assert_eq!(hit.resolved_by, ResolvedBy::Topology);

        // Pinned by normalized version string.
        raw.pin("green", "search", "3-0-0");
        let table = RoutingTable::compile(&raw).unwrap();
        request.topology = Some("green".to_string());
        assert_eq!(table.resolve(&request).unwrap().binding.host(), "www.google.com");
    }

    #[test]
    fn test_unpinned_service_in_topology_uses_constraint() {
        let mut raw = search_table();
        raw.pin("blue", "echo", "1.0.0");
        let table = RoutingTable::compile(&raw).unwrap();

        let mut request = params("search", None, Some("1.5.0"));
        request.topology = Some("blue".to_string());
        let hit = table.resolve(&request).unwrap();
        assert_eq!(hit.binding.host(), "www.aol.com");
        assert_eq!(hit.resolved_by, ResolvedBy::Constraint);
    }

    #[test]
    fn test_pin_to_missing_version_resolves_nothing() {
        let mut raw = search_table();
        raw.pin("blue", "search", "9.0.0");
        let table = RoutingTable::compile(&raw).unwrap();

        let mut request = params("search", None, None);
        request.topology = Some("blue".to_string());
        assert!(table.resolve(&request).is_none());
    }

    #[test]
    fn test_unknown_service() {
        let table = RoutingTable::compile(&search_table()).unwrap();
        assert!(table.resolve(&params("payments", None, None)).is_none());

        let no_service = RoutingParams::default();
        assert!(table.resolve(&no_service).is_none());
    }

    #[test]
    fn test_compile_defaults() {
        let table = RoutingTable::compile(&search_table()).unwrap();
        let binding = &table.service("search").unwrap().pinned("1.0.0").unwrap().binding;
        assert_eq!(binding.scheme(), Scheme::Http);
        assert_eq!(binding.host_header(), "www.aol.com");
        assert!(binding.headers().is_empty());
        assert!(binding.path_rewrite().is_identity());
        assert!(table.topologies().is_empty());
    }

    #[test]
    fn test_compile_endpoint_options() {
        let mut raw = RawRoutingTable::new();
        raw.set_binding(
            "echo",
            "1.0.0",
            EndpointConfig::new("localhost:8081")
                .with_scheme("HTTPS")
                .with_header("Host", "1-0-0.echo.example.com")
                .with_header("x-env", "staging")
                .with_rewrite("^/api/;/"),
        );
        let table = RoutingTable::compile(&raw).unwrap();
        let binding = &table.service("echo").unwrap().pinned("1.0.0").unwrap().binding;

        assert_eq!(binding.scheme(), Scheme::Https);
        assert_eq!(binding.host(), "localhost:8081");
        assert_eq!(binding.host_header(), "1-0-0.echo.example.com");
        assert_eq!(binding.headers().len(), 1);
        assert_eq!(binding.headers()[0].0, "x-env");
        assert_eq!(binding.path_rewrite().apply("/api/users"), "/users");
    }

    #[test]
    fn test_resolution_returns_supplied_endpoint() {
        let supplied = [
            ("echo", "1.0.0", EndpointConfig::new("localhost:8081")),
            ("echo", "1.1.0", EndpointConfig::new("localhost:8082").with_rewrite("^/echo;")),
            (
                "search",
                "2-0-0",
                EndpointConfig::new("www.bing.com")
                    .with_scheme("https")
                    .with_header("host", "bing.com")
                    .with_header("x-env", "prod"),
            ),
            ("search", "3.0.0", EndpointConfig::new("www.google.com").with_scheme("http")),
        ];
        let mut raw = RawRoutingTable::new();
        for (service, version, endpoint) in &supplied {
            raw.set_binding(*service, *version, endpoint.clone());
        }
        let table = RoutingTable::compile(&raw).unwrap();

        for (service, version, endpoint) in &supplied {
            let hit = table
                .resolve(&params(service, Some(*version), Some(*version)))
                .unwrap();
            assert_eq!(hit.service, *service);
            assert_eq!(hit.version, Version::parse(version).unwrap());
            assert_eq!(hit.binding.endpoint(), endpoint);
            assert_eq!(hit.binding.path_rewrite().is_identity(), endpoint.rewrite.is_none());
        }
    }

    #[test]
    fn test_compile_rejects_bad_tables() {
        let mut bad_rule = search_table();
        bad_rule.push_rewrite("missing-separator");
        assert!(matches!(
            RoutingTable::compile(&bad_rule),
            Err(CompileError::Rewrite { index: 0, .. })
        ));

        let mut bad_pattern = search_table();
        bad_pattern.push_rewrite("^ok$;fine");
        bad_pattern.push_rewrite("([;x");
        assert!(matches!(
            RoutingTable::compile(&bad_pattern),
            Err(CompileError::Rewrite { index: 1, .. })
        ));

        let mut bad_version = search_table();
        bad_version.set_binding("search", "latest", EndpointConfig::new("x.example.com"));
        assert!(matches!(
            RoutingTable::compile(&bad_version),
            Err(CompileError::Version { .. })
        ));

        let mut duplicate = search_table();
        duplicate.set_binding("search", "1-0-0", EndpointConfig::new("x.example.com"));
        assert!(matches!(
            RoutingTable::compile(&duplicate),
            Err(CompileError::DuplicateVersion { .. })
        ));

        let mut bad_scheme = RawRoutingTable::new();
        bad_scheme.set_binding("a", "1.0.0", EndpointConfig::new("a.internal").with_scheme("ftp"));
        assert!(matches!(
            RoutingTable::compile(&bad_scheme),
            Err(CompileError::Scheme { .. })
        ));

        let mut bad_host = RawRoutingTable::new();
        bad_host.set_binding("a", "1.0.0", EndpointConfig::new(""));
        assert!(matches!(
            RoutingTable::compile(&bad_host),
            Err(CompileError::Host { .. })
        ));

        let mut bad_header = RawRoutingTable::new();
        bad_header.set_binding("a", "1.0.0", EndpointConfig::new("a.internal").with_header("bad header", "x"));
        assert!(matches!(
            RoutingTable::compile(&bad_header),
            Err(CompileError::Header { .. })
        ));
    }

    #[test]
    fn test_raw_table_edits() {
        let mut raw = RawRoutingTable::new();
        raw.push_rewrite("^a$;b");
        raw.push_rewrite("^c$;d");

        assert_eq!(
            raw.remove_rewrite(1, "^x$;y"),
            Err(TableEditError::RewriteMismatch {
                index: 1,
                expected: "^x$;y".to_string(),
                found: "^c$;d".to_string(),
            })
        );
        assert_eq!(
            raw.remove_rewrite(5, "^a$;b"),
            Err(TableEditError::RewriteIndexOutOfRange { index: 5, len: 2 })
        );
        assert_eq!(raw.remove_rewrite(0, "^a$;b").unwrap(), "^a$;b");
        assert_eq!(raw.rewrites, vec!["^c$;d".to_string()]);

        assert!(raw.add_service("search"));
        assert!(!raw.add_service("search"));
        assert!(raw.services["search"].is_empty());
    }

    #[test]
    fn test_wire_format_yaml() {
        let yaml = r#"
rewrites:
  - "^http://legacy\\.internal/;http://search.internal/"
services:
  echo:
    "1.0.0":
      host: localhost:8081
      headers:
        host: 1-0-0.echo.example.com
    "1.0.1":
      host: localhost:8081
      scheme: http
topologies:
  blue:
    echo: "1.0.0"
"#;
        let raw: RawRoutingTable = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(raw.rewrites.len(), 1);
        assert_eq!(raw.services["echo"].len(), 2);
        assert_eq!(raw.topologies["blue"]["echo"], "1.0.0");

        let table = RoutingTable::compile(&raw).unwrap();
        assert_eq!(table.rewrites().len(), 1);
        assert_eq!(table.service("echo").unwrap().len(), 2);
    }
}
