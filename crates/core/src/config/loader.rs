use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Environment prefix for overrides, e.g. `DESKMIGRATE_TRACKER__API_TOKEN`.
pub const ENV_PREFIX: &str = "DESKMIGRATE_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
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
    use crate::config::SourceBackend;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID: &str = r#"
[source]
backend = "sqlite"
path = "helpdesk.db"

[tracker]
url = "https://example.atlassian.net"
user = "migrator@example.com"
api_token = "token"
project = "HELP"
issue_type = "Task"
"#;

    #[test]
    fn test_load_config_from_str_valid() {
        let config = load_config_from_str(VALID).unwrap();
        assert_eq!(config.source.backend, SourceBackend::Sqlite);
        assert_eq!(config.tracker.project, "HELP");
    }

    #[test]
    fn test_load_config_from_str_missing_source() {
        let toml = r#"
[tracker]
url = "https://example.atlassian.net"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/deskmigrate.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", VALID).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.tracker.issue_type, "Task");
        assert_eq!(
            config.source.path.as_deref(),
            Some(Path::new("helpdesk.db"))
        );
    }
}
