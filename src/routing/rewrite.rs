//! Pattern-based URL rewriting.
//!
//! # Responsibilities
//! - Compile `<pattern>;<replacement>` rule strings into regex transforms
//! - Apply an ordered chain of transforms to a URL until it stops changing
//! - Detect cycles instead of looping forever
//!
//! # Design Decisions
//! - Each pass applies only the first rule that changes the accumulator
//! - Malformed rules fail at compile time, never at request time
//! - Cycles are request-scoped errors, not process-fatal

use std::borrow::Cow;
use std::collections::HashSet;

use regex::Regex;
use thiserror::Error;
use url::Url;

/// Upper bound on rewrite passes for a single URL.
///
/// Chains that never repeat but never settle either (`$;x`) stop here.
pub const MAX_REWRITE_PASSES: usize = 100;

/// Upper bound on the length of a rewritten URL.
pub const MAX_REWRITE_LENGTH: usize = 16 * 1024;

/// Errors from compiling or applying rewrite rules.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("malformed rewrite rule '{rule}': expected '<pattern>;<replacement>', found {fields} field(s)")]
    Malformed { rule: String, fields: usize },

    #[error("invalid rewrite pattern in '{rule}': {source}")]
    Pattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("rewrite cycle detected at '{value}'")]
    Cycle { value: String },

    #[error("rewrite did not settle after {passes} passes")]
    TooManyPasses { passes: usize },

    #[error("rewritten URL exceeds {limit} bytes")]
    TooLong { limit: usize },

    #[error("rewrite produced an invalid URL '{value}': {source}")]
    InvalidUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
}

/// A single compiled pattern → replacement rule.
#[derive(Debug, Clone)]
pub struct Rewrite {
    pattern: Regex,
    replacement: String,
    rule: String,
}

impl Rewrite {
    /// Compile a rule string of the form `<pattern>;<replacement>`.
    ///
    /// The replacement may reference capture groups (`$1`, `${name}`).
    pub fn parse(rule: &str) -> Result<Self, RewriteError> {
        let fields: Vec<&str> = rule.split(';').collect();
        let [pattern, replacement] = fields.as_slice() else {
            return Err(RewriteError::Malformed {
                rule: rule.to_string(),
                fields: fields.len(),
            });
        };

        Self::new(pattern, replacement).map_err(|source| RewriteError::Pattern {
            rule: rule.to_string(),
            source,
        })
    }

    pub fn new(pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.to_string(),
            rule: format!("{};{}", pattern, replacement),
        })
    }

    /// Replace every match of the pattern in `input`.
    pub fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        self.pattern.replace_all(input, self.replacement.as_str())
    }

    /// The rule string this rewrite was compiled from.
    pub fn rule(&self) -> &str {
        &self.rule
    }
}

/// An ordered list of rewrites applied to a fixed point.
#[derive(Debug, Clone, Default)]
pub struct RewriteChain {
    rules: Vec<Rewrite>,
}

impl RewriteChain {
    pub fn new(rules: Vec<Rewrite>) -> Self {
        Self { rules }
    }

    /// Compile a list of rule strings, failing on the first bad rule.
    pub fn compile<S: AsRef<str>>(rules: &[S]) -> Result<Self, RewriteError> {
        let rules = rules
            .iter()
            .map(|rule| Rewrite::parse(rule.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rewrite `input` until no rule changes it.
    pub fn rewrite(&self, input: &str) -> Result<String, RewriteError> {
        let mut accumulator = input.to_string();
        let mut seen: HashSet<String> = HashSet::new();

        for _ in 0..MAX_REWRITE_PASSES {
            let Some((rewrite, next)) = self.first_change(&accumulator) else {
                return Ok(accumulator);
            };

            tracing::debug!(rule = %rewrite.rule(), from = %accumulator, to = %next, "Rewrite applied");

            if next.len() > MAX_REWRITE_LENGTH {
                return Err(RewriteError::TooLong {
                    limit: MAX_REWRITE_LENGTH,
                });
            }
            if !seen.insert(next.clone()) {
                return Err(RewriteError::Cycle { value: next });
            }
            accumulator = next;
        }

        Err(RewriteError::TooManyPasses {
            passes: MAX_REWRITE_PASSES,
        })
    }

    /// Rewrite the full string form of `url` and parse the result.
    pub fn rewrite_url(&self, url: &Url) -> Result<Url, RewriteError> {
        if self.rules.is_empty() {
            return Ok(url.clone());
        }

        let value = self.rewrite(url.as_str())?;
        Url::parse(&value).map_err(|source| RewriteError::InvalidUrl { value, source })
    }

    fn first_change(&self, accumulator: &str) -> Option<(&Rewrite, String)> {
        self.rules.iter().find_map(|rewrite| match rewrite.apply(accumulator) {
            Cow::Owned(result) if result != accumulator => Some((rewrite, result)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(rules: &[&str]) -> RewriteChain {
        RewriteChain::compile(rules).unwrap()
    }

    #[test]
    fn test_parse_requires_two_fields() {
        assert!(matches!(
            Rewrite::parse("no-separator"),
            Err(RewriteError::Malformed { fields: 1, .. })
        ));
        assert!(matches!(
            Rewrite::parse("a;b;c"),
            Err(RewriteError::Malformed { fields: 3, .. })
        ));
        assert!(matches!(
            Rewrite::parse("(unclosed;x"),
            Err(RewriteError::Pattern { .. })
        ));
    }

    #[test]
    fn test_capture_groups() {
        let rewrite = Rewrite::parse("^bob/(.*)$;foo/$1").unwrap();
        assert_eq!(rewrite.apply("bob/bazzer"), "foo/bazzer");
        assert_eq!(rewrite.rule(), "^bob/(.*)$;foo/$1");
    }

    #[test]
    fn test_chain_reaches_fixed_point() {
        let rules = chain(&["^a$;b", "^b$;c"]);
        assert_eq!(rules.rewrite("a").unwrap(), "c");
        assert_eq!(rules.rewrite("zzz").unwrap(), "zzz");
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let rules = chain(&[
            r"^http://www\.([a-z]+)\.example\.com/;http://$1.example.com/",
            r"/v1/;/",
        ]);
        let once = rules.rewrite("http://www.search.example.com/v1/find").unwrap();
        assert_eq!(once, "http://search.example.com/find");
        assert_eq!(rules.rewrite(&once).unwrap(), once);
    }

    #[test]
    fn test_first_matching_rule_wins_each_pass() {
        // Both rules match "x"; only the first is applied in a pass.
        let rules = chain(&["^x$;y", "^x$;z"]);
        assert_eq!(rules.rewrite("x").unwrap(), "y");
    }

    #[test]
    fn test_cycle_detected() {
        let rules = chain(&["^a$;b", "^b$;a"]);
        assert!(matches!(rules.rewrite("a"), Err(RewriteError::Cycle { .. })));
    }

    #[test]
    fn test_unbounded_growth_stops() {
        let appending = chain(&["$;x"]);
        assert!(matches!(
            appending.rewrite("a"),
            Err(RewriteError::TooManyPasses { .. })
        ));

        let doubling = chain(&["a;aa"]);
        assert!(matches!(
            doubling.rewrite("a"),
            Err(RewriteError::TooLong { .. })
        ));
    }

    #[test]
    fn test_rewrite_url() {
        let rules = chain(&[r"^http://legacy\.internal/;http://search.internal/"]);
        let url = Url::parse("http://legacy.internal/q?term=rust").unwrap();
        let rewritten = rules.rewrite_url(&url).unwrap();
        assert_eq!(rewritten.host_str(), Some("search.internal"));
        assert_eq!(rewritten.query(), Some("term=rust"));

        let broken = chain(&["^http://;"]);
        assert!(matches!(
            broken.rewrite_url(&url),
            Err(RewriteError::InvalidUrl { .. })
        ));
    }
}
