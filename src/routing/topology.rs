//! Topology overrides.
//!
//! A topology pins specific services to specific versions. When the
//! request names a topology that pins its service, constraint resolution
//! is skipped entirely.

use std::collections::{BTreeMap, HashMap};

/// Topology key → service name → pinned version string.
#[derive(Debug, Clone, Default)]
pub struct TopologyTable {
    pins: HashMap<String, HashMap<String, String>>,
}

impl TopologyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the wire representation. Empty version strings are dropped,
    /// they never pin anything.
    pub fn from_raw(raw: &BTreeMap<String, BTreeMap<String, String>>) -> Self {
        let pins = raw
            .iter()
            .map(|(key, services)| {
                let services = services
                    .iter()
                    .filter(|(_, version)| !version.trim().is_empty())
                    .map(|(service, version)| (service.clone(), version.trim().to_string()))
                    .collect();
                (key.clone(), services)
            })
            .collect();
        Self { pins }
    }

    /// Pinned version for `service` within `topology`, if any.
    ///
    /// A topology that exists but does not mention the service yields `None`
    /// so the caller falls through to constraint resolution.
    pub fn resolve(&self, topology: &str, service: &str) -> Option<&str> {
        self.pins
            .get(topology)
            .and_then(|services| services.get(service))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}
