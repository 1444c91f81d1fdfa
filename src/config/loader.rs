use std::{fs, fs::File, io::Write, path::Path};

use anyhow::{Context, Result};
use config::{Config, Environment};
use log::{debug, info};

use super::ClientConfig;

pub fn get_default_config() -> &'static str {
    include_str!("../../config/ots.toml")
}

/// Loads the client configuration from `path`, layered with `OTS__*`
/// environment variables. A default file is written first if none exists.
pub fn load_configuration(path: &Path) -> Result<ClientConfig> {
    load_configuration_with_env(path, Environment::with_prefix("OTS"))
}

fn load_configuration_with_env(path: &Path, environment: Environment) -> Result<ClientConfig> {
    if !path.exists() {
        write_config_to(path, get_default_config()).context("Could not create default config")?;
        info!(path:% = path.display(); "Created new configuration file");
    }

    let filename = path.to_str().context("Invalid config file path")?;

    let cfg = Config::builder()
        .add_source(config::File::with_name(filename).format(config::FileFormat::Toml))
        .add_source(environment.prefix_separator("__").separator("__").try_parsing(true))
        .build()
        .context("Could not build config")?;

    let client_config: ClientConfig = cfg
        .try_deserialize()
        .context("Could not deserialize client configuration")?;

    debug!(
        endpoint = client_config.endpoint.as_str(),
        instance = client_config.instance_name.as_str();
        "Loaded client configuration"
    );

    Ok(client_config)
}

pub fn write_config_to(path: &Path, source: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create parent directories")?;
    };

    let mut file = File::create(path).context("Failed to create config file")?;
    file.write_all(source.as_bytes())
        .context("Failed to write config content")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::tempdir;

    use super::*;
    use crate::config::RetryPolicyKind;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let source: config::Map<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Environment::with_prefix("OTS").source(Some(source))
    }

    #[test]
    fn missing_file_is_created_from_template() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("ots.toml");

        let config = load_configuration_with_env(&path, env(&[])).unwrap();

        assert!(path.exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), get_default_config());
        assert_eq!(config.instance_name, "your-instance");
        assert_eq!(config.socket_timeout(), Duration::from_secs(50));
        assert_eq!(config.retry.policy, RetryPolicyKind::Default);
    }

    #[test]
    fn file_values_are_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ots.toml");
        write_config_to(
            &path,
            r#"
endpoint = "http://127.0.0.1:8800"
access_id = "id"
access_key = "key"
instance_name = "inst"
total_timeout_ms = 1500

[retry]
policy = "no_delay"
max_retry_times = 2
"#,
        )
        .unwrap();

        let config = load_configuration_with_env(&path, env(&[])).unwrap();
        assert_eq!(config.endpoint, "http://127.0.0.1:8800");
        assert_eq!(config.total_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.retry.policy, RetryPolicyKind::NoDelay);
        assert_eq!(config.retry.max_retry_times, Some(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ots.toml");
        write_config_to(&path, get_default_config()).unwrap();

        let config = load_configuration_with_env(
            &path,
            env(&[
                ("OTS__ACCESS_ID", "env-id"),
                ("OTS__ACCESS_KEY", "env-key"),
                ("OTS__SOCKET_TIMEOUT_SECS", "5"),
                ("OTS__RETRY__POLICY", "no_retry"),
            ]),
        )
        .unwrap();

        assert_eq!(config.access_id, "env-id");
        assert_eq!(config.access_key, "env-key");
        assert_eq!(config.socket_timeout(), Duration::from_secs(5));
        assert_eq!(config.retry.policy, RetryPolicyKind::NoRetry);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ots.toml");
        write_config_to(&path, "endpoint = [").unwrap();
        assert!(load_configuration_with_env(&path, env(&[])).is_err());
    }
}
