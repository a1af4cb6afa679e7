use config::Config;
use serde::Deserialize;
use std::net::SocketAddr;
use triage::configuration::ConfigError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    /// The `server` section of the layered settings, defaults when absent
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        match config.get::<ServerSettings>("server") {
            Ok(settings) => Ok(settings),
            Err(config::ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(err) => Err(ConfigError::Other(err)),
        }
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid server address {}:{}: {}", self.host, self.port, e))
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("TRIAGE_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("TRIAGE_CONFIG", "/nonexistent/triage.toml");
        assert!(triage::configuration::layered().is_err());
        env::remove_var("TRIAGE_CONFIG");

        let config = triage::configuration::layered().unwrap();
        let settings = ServerSettings::from_config(&config).unwrap();
        assert_eq!(settings, ServerSettings::default());
        assert_eq!(settings.socket_addr().unwrap().to_string(), "127.0.0.1:3000");
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("TRIAGE_SERVER__PORT", "8080");
        env::set_var("TRIAGE_SERVER__HOST", "0.0.0.0");

        let config = triage::configuration::layered().unwrap();
        let settings = ServerSettings::from_config(&config).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.socket_addr().unwrap().to_string(), "0.0.0.0:8080");

        env::remove_var("TRIAGE_SERVER__PORT");
        env::remove_var("TRIAGE_SERVER__HOST");
    }

    #[test]
    fn test_invalid_address() {
        let settings = ServerSettings {
            host: "not a host".to_string(),
            port: 3000,
        };
        assert!(settings.socket_addr().is_err());
    }
}
