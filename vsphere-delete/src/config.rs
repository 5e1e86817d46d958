//! Configuration loading for vsphere-delete.
//!
//! Connection settings can come from a TOML file, command-line flags, or both;
//! flags win. The file is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vsphere_api::{DEFAULT_RELEASE, VimOptions};

use crate::delete::DeleteOptions;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub vsphere: VsphereConfig,
    /// Task waiting settings (optional)
    #[serde(default)]
    pub task: TaskConfig,
}

/// vCenter/ESXi connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VsphereConfig {
    /// Server URL (e.g., "https://vcenter.example.com" or ".../sdk")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Login user (e.g., "administrator@vsphere.local")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Accept invalid TLS certificates (for self-signed vCenter certs)
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// VI/JSON API release in the endpoint path
    #[serde(default = "default_release")]
    pub release: String,
}

fn default_release() -> String {
    DEFAULT_RELEASE.to_string()
}

impl Default for VsphereConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            accept_invalid_certs: false,
            release: default_release(),
        }
    }
}

/// Task waiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskConfig {
    /// Give up waiting for the destroy task after this many seconds (0 = never)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Server-side wait per property collector call
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_wait_secs() -> u64 {
    60
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

/// Validated connection parameters.
#[derive(Debug, Clone)]
pub struct Connection {
    pub url: String,
    pub username: String,
    pub password: String,
    pub options: VimOptions,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::IoError(format!(
                "Failed to read config file {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from the default location.
    ///
    /// Searches in order:
    /// 1. `./vsphere-delete.toml` (current directory)
    /// 2. `~/.config/vsphere-delete/config.toml` (user config)
    /// 3. `/etc/vsphere-delete/config.toml` (system config, Linux only)
    pub fn load_default() -> Result<Self, ConfigError> {
        let candidates = Self::config_search_paths();

        for path in &candidates {
            if path.exists() {
                tracing::info!("Loading config from {:?}", path);
                return Self::load(path);
            }
        }

        Err(ConfigError::NotFound(format!(
            "No config file found. Searched: {candidates:?}"
        )))
    }

    /// Get the list of paths to search for config files.
    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("vsphere-delete.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("vsphere-delete").join("config.toml"));
        }

        #[cfg(target_os = "linux")]
        paths.push(PathBuf::from("/etc/vsphere-delete/config.toml"));

        paths
    }

    /// Overlay command-line values on top of the file values.
    pub fn merge_args(
        &mut self,
        url: Option<String>,
        username: Option<String>,
        password: Option<String>,
        insecure: bool,
        timeout_secs: Option<u64>,
    ) {
        if url.is_some() {
            self.vsphere.url = url;
        }
        if username.is_some() {
            self.vsphere.username = username;
        }
        if password.is_some() {
            self.vsphere.password = password;
        }
        if insecure {
            self.vsphere.accept_invalid_certs = true;
        }
        if let Some(timeout_secs) = timeout_secs {
            self.task.timeout_secs = timeout_secs;
        }
    }

    /// Validate the configuration and extract the connection parameters.
    pub fn connection(&self) -> Result<Connection, ConfigError> {
        let mut errors = Vec::new();

        let url = non_empty(&self.vsphere.url);
        let username = non_empty(&self.vsphere.username);
        let password = non_empty(&self.vsphere.password);

        if url.is_none() {
            errors.push("url: vCenter or ESXi URL (--url or vsphere.url)");
        }
        if username.is_none() {
            errors.push("username: login user (--username or vsphere.username)");
        }
        if password.is_none() {
            errors.push("password: login password (--password or vsphere.password)");
        }

        let (Some(url), Some(username), Some(password)) = (url, username, password) else {
            return Err(ConfigError::ValidationError(format!(
                "Connection settings incomplete\n\nPlease set:\n  - {}",
                errors.join("\n  - ")
            )));
        };

        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(ConfigError::ValidationError(format!(
                "URL must start with https:// or http://, got {url:?}"
            )));
        }

        if self.vsphere.release.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "vsphere.release must not be empty".to_string(),
            ));
        }

        if self.task.max_wait_secs == 0 {
            return Err(ConfigError::ValidationError(
                "task.max_wait_secs must be at least 1".to_string(),
            ));
        }

        Ok(Connection {
            url: url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            options: VimOptions {
                release: self.vsphere.release.clone(),
                accept_invalid_certs: self.vsphere.accept_invalid_certs,
            },
        })
    }

    pub fn delete_options(&self) -> DeleteOptions {
        DeleteOptions {
            task_timeout: (self.task.timeout_secs > 0)
                .then(|| Duration::from_secs(self.task.timeout_secs)),
            max_wait: Some(Duration::from_secs(self.task.max_wait_secs)),
        }
    }
}

/// Expand ~ to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str()
        && path_str.starts_with("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(&path_str[2..]);
    }
    path.to_path_buf()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
