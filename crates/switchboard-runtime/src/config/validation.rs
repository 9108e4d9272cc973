//! Configuration validation utilities.

use std::net::SocketAddr;

use switchboard_core::Locale;

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    DispatchConfig, LogOutput, LoggingConfig, ServerConfig, StoreConfig, SwitchboardConfig,
};

/// Validates the entire configuration.
pub fn validate_config(config: &SwitchboardConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_server_config(&config.server)?;
    validate_dispatch_config(&config.dispatch)?;
    validate_store_config(&config.store)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "File log output requires logging.file_path",
        ));
    }
    Ok(())
}

fn validate_server_config(server: &ServerConfig) -> ConfigResult<()> {
    server
        .bind
        .parse::<SocketAddr>()
        .map_err(|e| ConfigError::invalid_address(&server.bind, e.to_string()))?;
    Ok(())
}

fn validate_dispatch_config(dispatch: &DispatchConfig) -> ConfigResult<()> {
    if dispatch.worker_limit == 0 {
        return Err(ConfigError::validation(
            "dispatch.worker_limit must be greater than 0",
        ));
    }

    if Locale::parse_tag(&dispatch.default_locale).is_none() {
        return Err(ConfigError::InvalidLocale(dispatch.default_locale.clone()));
    }

    if dispatch.namespace.trim().is_empty() {
        return Err(ConfigError::validation("dispatch.namespace must not be empty"));
    }

    for (name, value) in [
        ("lock_timeout_ms", dispatch.lock_timeout_ms),
        ("dispatch_timeout_ms", dispatch.dispatch_timeout_ms),
    ] {
        if value == Some(0) {
            return Err(ConfigError::validation(format!(
                "dispatch.{name} must be greater than 0 when set"
            )));
        }
    }

    Ok(())
}

fn validate_store_config(store: &StoreConfig) -> ConfigResult<()> {
    if store.dialog_max_validity_secs == 0 {
        return Err(ConfigError::validation(
            "store.dialog_max_validity_secs must be greater than 0",
        ));
    }

    if store.max_actions_by_dialog == 0 {
        return Err(ConfigError::validation(
            "store.max_actions_by_dialog must be greater than 0",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&SwitchboardConfig::default()).is_ok());
    }

    #[test]
    fn rejects_zero_worker_limit() {
        let mut config = SwitchboardConfig::default();
        config.dispatch.worker_limit = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn rejects_bad_locale() {
        let mut config = SwitchboardConfig::default();
        config.dispatch.default_locale = "???".into();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidLocale(_))
        ));
    }

    #[test]
    fn rejects_zero_dialog_validity() {
        let mut config = SwitchboardConfig::default();
        config.store.dialog_max_validity_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_bad_bind_address() {
        let mut config = SwitchboardConfig::default();
        config.server.bind = "localhost".into();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn file_output_needs_path() {
        let mut config = SwitchboardConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());
    }
}
