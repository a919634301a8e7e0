//! Semantic versions and min/max constraints.
//!
//! # Responsibilities
//! - Parse version strings leniently (`v` prefix, missing minor/patch)
//! - Tolerate DNS-label-safe encodings (`1-0-0` for `1.0.0`)
//! - Build inclusive `[min, max]` constraints from optional bounds
//!
//! # Design Decisions
//! - Ordering is plain semver precedence, pre-releases included
//! - Request-side parsing never fails loudly: see [`parse_version`]

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Number of dashes converted to dots before parsing.
const DASH_SUBSTITUTIONS: usize = 3;

/// Errors produced while parsing a version string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,

    #[error("invalid version '{input}': {reason}")]
    Invalid { input: String, reason: String },
}

impl VersionError {
    fn invalid(input: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// A parsed semantic version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(semver::Version);

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    /// Parse a version string.
    ///
    /// Up to the first three dashes are turned into dots first, so hostname
    /// labels such as `1-0-0` or `2-1-0-beta` are accepted. Missing minor and
    /// patch components default to zero.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }

        let normalized = trimmed.replacen('-', ".", DASH_SUBSTITUTIONS);
        let body = normalized.strip_prefix('v').unwrap_or(&normalized);
        let (body, build) = match body.split_once('+') {
            Some((body, build)) => (body, Some(build)),
            None => (body, None),
        };

        let mut core = [0u64; 3];
        let mut parsed = 0;
        let mut rest = body;
        while parsed < core.len() {
            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            if digits == 0 {
                break;
            }
            core[parsed] = rest[..digits]
                .parse()
                .map_err(|_| VersionError::invalid(input, "numeric component overflows"))?;
            parsed += 1;
            rest = &rest[digits..];

            match rest.strip_prefix('.') {
                Some(next) if parsed < core.len() && next.starts_with(|c: char| c.is_ascii_digit()) => {
                    rest = next;
                }
                _ => break,
            }
        }

        if parsed == 0 {
            return Err(VersionError::invalid(input, "missing major component"));
        }

        let pre = if rest.is_empty() {
            semver::Prerelease::EMPTY
        } else {
            let tag = match (rest.strip_prefix('-'), rest.strip_prefix('.')) {
                (Some(tag), _) => tag,
                // `1.0.0.beta` comes from `1-0-0-beta` after normalization;
                // a fourth numeric component is not a pre-release.
                (None, Some(tag)) if !tag.starts_with(|c: char| c.is_ascii_digit()) => tag,
                _ => return Err(VersionError::invalid(input, "unexpected trailing characters")),
            };
            if tag.is_empty() {
                return Err(VersionError::invalid(input, "empty pre-release"));
            }
            semver::Prerelease::new(tag).map_err(|e| VersionError::invalid(input, e.to_string()))?
        };

        let build = match build {
            Some(meta) => semver::BuildMetadata::new(meta)
                .map_err(|e| VersionError::invalid(input, e.to_string()))?,
            None => semver::BuildMetadata::EMPTY,
        };

        Ok(Self(semver::Version {
            major: core[0],
            minor: core[1],
            patch: core[2],
            pre,
            build,
        }))
    }

    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }
}

/// Parse a request-supplied version, treating garbage as "no bound".
pub fn parse_version(input: &str) -> Option<Version> {
    Version::parse(input).ok()
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// Inclusive version range. An absent bound is open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraint {
    min: Option<Version>,
    max: Option<Version>,
}

impl Constraint {
    /// Build a constraint from optional bounds. No bounds means `>= 0.0.0`.
    pub fn new(min: Option<Version>, max: Option<Version>) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> Option<&Version> {
        self.min.as_ref()
    }

    pub fn max(&self) -> Option<&Version> {
        self.max.as_ref()
    }

    pub fn matches(&self, version: &Version) -> bool {
        let above_min = self.min.as_ref().map_or(true, |min| version >= min);
        let below_max = self.max.as_ref().map_or(true, |max| version <= max);
        above_min && below_max
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => write!(f, ">= {}, <= {}", min, max),
            (Some(min), None) => write!(f, ">= {}", min),
            (None, Some(max)) => write!(f, "<= {}", max),
            (None, None) => write!(f, ">= 0.0.0"),
        }
    }
}
