//! Client configuration loaded from `~/.config/regi/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Public course catalog JSON endpoint.
pub const DEFAULT_CATALOG_URL: &str =
    "https://registrar.nu.edu.kz/my-registrar/public-course-catalog/json";

/// PDF download endpoint.
pub const DEFAULT_DOWNLOADS_URL: &str = "https://registrar.nu.edu.kz/registrar_downloads/json";

/// HTML page that links the currently published schedules.
pub const DEFAULT_SCHEDULES_URL: &str = "https://registrar.nu.edu.kz/course-schedules";

/// Endpoints, timeouts and TLS behaviour for a [`RegistrarClient`](crate::RegistrarClient).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub catalog_url: String,
    pub downloads_url: String,
    pub schedules_url: String,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Re-issue a request once without certificate validation when the
    /// server certificate's issuer is unknown. The registrar has served an
    /// incomplete chain.
    pub accept_incomplete_chain: bool,
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            downloads_url: DEFAULT_DOWNLOADS_URL.to_string(),
            schedules_url: DEFAULT_SCHEDULES_URL.to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            accept_incomplete_chain: false,
            user_agent: None,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Load the config from `~/.config/regi/config.toml`.
    ///
    /// Returns defaults if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load the config from an explicit path, with the same missing-file rule as [`Self::load`].
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }
}

/// Return the path to the config file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("regi")
        .join("config.toml")
}
