//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LogFormat, SourceConfig, UnroutedPolicy};

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
[listener]
bind_address = "127.0.0.1:1090"

[routing]
unrouted = "reject"

[source]
kind = "redis"
url = "redis://127.0.0.1:6379/9"

[observability]
log_format = "json"

[admin]
enabled = true
api_key = "secret"
"#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:1090");
        assert_eq!(config.routing.unrouted, UnroutedPolicy::Reject);
        assert_eq!(
            config.source,
            SourceConfig::Redis {
                url: "redis://127.0.0.1:6379/9".to_string()
            }
        );
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.timeouts.request_secs, 30);
        assert_eq!(config.admin.api_key, "secret");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.routing.unrouted, UnroutedPolicy::Passthrough);
        assert!(matches!(config.source, SourceConfig::File { .. }));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(matches!(
            parse_config("[timeouts]\nrequest_secs = 0\n"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            parse_config("[source]\nkind = \"etcd\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
