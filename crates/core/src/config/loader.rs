use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("SIPHON_").split("_"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[telegram]
bot_token = "123:abc"
authorized_users = [42]

[agent]
email = "jd@example.test"
password = "secret"
device_name = "jd-home"
download_dir = "/downloads"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.telegram.authorized_users, vec![42]);
    }

    #[test]
    fn test_load_config_from_str_missing_agent() {
        let toml = r#"
[telegram]
bot_token = "123:abc"
authorized_users = [42]
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[telegram]
bot_token = "123:abc"
authorized_users = [42, 43]

[agent]
email = "jd@example.test"
password = "secret"
device_name = "jd-attic"
download_dir = "/srv/downloads"

[orchestrator]
poll_interval_ms = 4000
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.agent.device_name, "jd-attic");
        assert_eq!(config.orchestrator.poll_interval_ms, 4000);
    }
}
