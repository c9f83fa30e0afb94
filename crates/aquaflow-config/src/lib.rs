//! Shared configuration for AquaFlow Connect hosts.
//!
//! Loads settings from a TOML file layered under `AQUAFLOW_*` environment
//! variables, validates them, and resolves them into the core's
//! [`AccountConfig`]. Hosts that carry their own configuration systems
//! (the usual case for platform adapters) can skip this crate and build
//! an `AccountConfig` directly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use aquaflow_core::{AccountConfig, Portal, TransportConfig};

/// Environment variable prefix: `AQUAFLOW_USERNAME`, `AQUAFLOW_PASSWORD`, ...
const ENV_PREFIX: &str = "AQUAFLOW_";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File/environment extraction failed.
    #[error("configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// A value was present but unusable.
    #[error("invalid configuration: {field}: {reason}")]
    Validation { field: String, reason: String },
}

/// Account settings as they appear on disk / in the environment.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Portal account name (usually an email address).
    pub username: String,
    /// Portal account password.
    pub password: SecretString,

    /// Base URL override for local polling. Absent means the cloud portal.
    #[serde(default)]
    pub portal_url: Option<Url>,

    /// Accept self-signed certificates (local devices ship them).
    #[serde(default)]
    pub danger_accept_invalid_certs: bool,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Settings {
    /// Load settings from the given TOML file (if it exists) layered
    /// under `AQUAFLOW_*` environment variables.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new();
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }
        let settings: Self = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(Box::new)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.username.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "username".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.password.expose_secret().is_empty() {
            return Err(ConfigError::Validation {
                field: "password".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Validation {
                field: "poll_interval_secs".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        Ok(())
    }

    /// Resolve into the coordinator's account configuration.
    pub fn account_config(&self) -> AccountConfig {
        let portal = self
            .portal_url
            .clone()
            .map_or(Portal::Cloud, Portal::Local);

        AccountConfig {
            username: self.username.clone(),
            password: self.password.clone(),
            portal,
            transport: TransportConfig {
                timeout: Duration::from_secs(self.timeout_secs),
                max_retries: self.max_retries,
                danger_accept_invalid_certs: self.danger_accept_invalid_certs,
            },
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        }
    }
}

/// Default config file location: `<platform config dir>/aquaflow/aquaflow.toml`.
pub fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("net", "AquaFlow", "aquaflow")
        .map(|dirs| dirs.config_dir().join("aquaflow.toml"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn file_values_load_with_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "aquaflow.toml",
                r#"
                    username = "user@example.com"
                    password = "hunter2"
                "#,
            )?;

            let settings = Settings::load(Some(Path::new("aquaflow.toml"))).unwrap();
            assert_eq!(settings.username, "user@example.com");
            assert_eq!(settings.poll_interval_secs, 60);
            assert_eq!(settings.timeout_secs, 30);
            assert_eq!(settings.max_retries, 3);
            assert!(settings.portal_url.is_none());
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_the_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "aquaflow.toml",
                r#"
                    username = "user@example.com"
                    password = "hunter2"
                    poll_interval_secs = 60
                "#,
            )?;
            jail.set_env("AQUAFLOW_POLL_INTERVAL_SECS", "15");

            let settings = Settings::load(Some(Path::new("aquaflow.toml"))).unwrap();
            assert_eq!(settings.poll_interval_secs, 15);
            Ok(())
        });
    }

    #[test]
    fn missing_credentials_fail_validation() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "aquaflow.toml",
                r#"
                    username = "  "
                    password = "hunter2"
                "#,
            )?;

            let result = Settings::load(Some(Path::new("aquaflow.toml")));
            assert!(matches!(
                result,
                Err(ConfigError::Validation { ref field, .. }) if field == "username"
            ));
            Ok(())
        });
    }

    #[test]
    fn portal_url_selects_local_polling() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "aquaflow.toml",
                r#"
                    username = "user@example.com"
                    password = "hunter2"
                    portal_url = "http://192.168.1.50:8080/"
                "#,
            )?;

            let settings = Settings::load(Some(Path::new("aquaflow.toml"))).unwrap();
            let account = settings.account_config();
            assert!(matches!(account.portal, Portal::Local(_)));
            assert_eq!(account.poll_interval, Duration::from_secs(60));
            Ok(())
        });
    }
}
