use super::{Config, ConfigError};

/// Validate a loaded configuration before any component is built.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.telegram.bot_token.is_empty() {
        return Err(invalid("telegram.bot_token must not be empty"));
    }
    if config.telegram.authorized_users.is_empty() {
        return Err(invalid(
            "telegram.authorized_users must list at least one user id",
        ));
    }
    if config.agent.email.is_empty() || config.agent.password.is_empty() {
        return Err(invalid("agent.email and agent.password are required"));
    }
    if config.agent.device_name.is_empty() {
        return Err(invalid("agent.device_name must not be empty"));
    }
    if config.delivery.max_payload_bytes == 0 {
        return Err(invalid("delivery.max_payload_bytes must be positive"));
    }
    if config.delivery.album_batch_size == 0 {
        return Err(invalid("delivery.album_batch_size must be positive"));
    }
    if config.orchestrator.poll_interval_ms == 0 {
        return Err(invalid("orchestrator.poll_interval_ms must be positive"));
    }
    if config.orchestrator.settle_polls == 0 {
        return Err(invalid("orchestrator.settle_polls must be positive"));
    }
    if config.orchestrator.discovery_timeout_secs
        < config.orchestrator.settle_polls as u64
    {
        return Err(invalid(
            "orchestrator.discovery_timeout_secs must allow at least settle_polls polls",
        ));
    }
    if config.pipeline.max_parallel == 0 {
        return Err(invalid("pipeline.max_parallel must be positive"));
    }

    Ok(())
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::ValidationError(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn valid_toml() -> String {
        r#"
[telegram]
bot_token = "123:abc"
authorized_users = [42]

[agent]
email = "jd@example.test"
password = "secret"
device_name = "jd-home"
download_dir = "/downloads"
"#
        .to_string()
    }

    #[test]
    fn test_valid_config_passes() {
        let config = load_config_from_str(&valid_toml()).unwrap();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_allow_list_rejected() {
        let toml = valid_toml().replace("authorized_users = [42]", "authorized_users = []");
        let config = load_config_from_str(&toml).unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_zero_payload_ceiling_rejected() {
        let toml = format!("{}\n[delivery]\nmax_payload_bytes = 0\n", valid_toml());
        let config = load_config_from_str(&toml).unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let toml = format!("{}\n[orchestrator]\npoll_interval_ms = 0\n", valid_toml());
        let config = load_config_from_str(&toml).unwrap();
        assert!(validate_config(&config).is_err());
    }
}
