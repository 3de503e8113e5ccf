use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Worker pool and queue sizes are nonzero
/// - Artifact size cap and reaper batch size are nonzero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.dispatch.workers == 0 {
        return Err(ConfigError::ValidationError(
            "dispatch.workers cannot be 0".to_string(),
        ));
    }

    if config.dispatch.queue_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "dispatch.queue_capacity cannot be 0".to_string(),
        ));
    }

    if config.converter.max_artifact_size == 0 {
        return Err(ConfigError::ValidationError(
            "converter.max_artifact_size cannot be 0".to_string(),
        ));
    }

    if config.reaper.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "reaper.batch_size cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use std::net::IpAddr;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = Config {
            server: ServerConfig {
                host: "0.0.0.0".parse::<IpAddr>().unwrap(),
                port: 0,
            },
            ..Default::default()
        };
        let result = validate_config(&config);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_workers_fails() {
        let mut config = Config::default();
        config.dispatch.workers = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_artifact_cap_fails() {
        let mut config = Config::default();
        config.converter.max_artifact_size = 0;
        assert!(validate_config(&config).is_err());
    }
}
