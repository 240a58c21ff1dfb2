//! Daemon configuration.
//!
//! Loaded from a TOML file. Every field has a default, so an empty file (or
//! no file at all) yields a daemon with a single loopback source.
//!
//! ```toml
//! listen = "0.0.0.0:8073"
//! max_clients = 100
//! heartbeat_secs = 5
//! monitor_secs = 60
//!
//! [auth]
//! username = "admin"
//! password = "secret"
//!
//! [[sources]]
//! label = "rtl0"
//! description = "RTL-SDR dongle, 2 m band"
//! center_freq = 145000000
//! sample_rate = 2048000
//! ```

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use websdr_core::SourceDescriptor;

use crate::auth::{Authenticator, DenyAll, StaticCredentials};
use crate::hardware::SourceTable;
use crate::loopback::{LoopbackEngineFactory, LoopbackFlowGraph, LoopbackSource};
use crate::registry::{Backend, RegistryOptions, DEFAULT_HEARTBEAT_SECS, MAX_SESSIONS};
use crate::server::DEFAULT_LISTEN_ADDR;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "WEBSDR_CONFIG";

/// Environment variable overriding `listen`.
pub const LISTEN_ENV: &str = "WEBSDR_LISTEN";

/// Default resource monitor interval in seconds.
pub const DEFAULT_MONITOR_SECS: u64 = 60;

// ============================================================================
// Config
// ============================================================================

/// Top-level daemon configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// WebSocket listen address
    pub listen: String,
    /// Maximum concurrent sessions
    pub max_clients: usize,
    /// All-sessions refresh period, 0 disables
    pub heartbeat_secs: u64,
    /// Resource monitor period, 0 disables
    pub monitor_secs: u64,
    /// Credentials for privileged sessions; without them every login fails
    pub auth: Option<AuthConfig>,
    /// Hardware sources, in table order
    pub sources: Vec<SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN_ADDR.to_string(),
            max_clients: MAX_SESSIONS,
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            monitor_secs: DEFAULT_MONITOR_SECS,
            auth: None,
            sources: vec![SourceConfig::default()],
        }
    }
}

/// Static login credentials.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// One hardware source.
///
/// `center_freq`, `sample_rate`, `gain` and `auto_gain` are the initial
/// register values of the loopback driver.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub label: String,
    pub description: String,
    pub converter_offset: i64,
    pub default_offset: i64,
    pub center_freq: i64,
    pub sample_rate: u32,
    pub gain: f64,
    pub auto_gain: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            label: "loopback".to_string(),
            description: "Loopback test source".to_string(),
            converter_offset: 0,
            default_offset: 0,
            center_freq: 100_000_000,
            sample_rate: 2_048_000,
            gain: 0.0,
            auto_gain: false,
        }
    }
}

impl Config {
    /// Reads and validates a config file.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Io` if the file cannot be read
    /// - `ConfigError::Parse` if it is not valid TOML for this schema
    /// - `ConfigError::Invalid` if validation fails
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let config: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Replaces the listen address if an override is given.
    pub fn apply_listen_override(&mut self, listen: Option<String>) -> Result<(), ConfigError> {
        if let Some(listen) = listen {
            self.listen = listen;
            self.listen_addr()?;
        }
        Ok(())
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;

        if self.max_clients == 0 {
            return Err(ConfigError::invalid("max_clients must be at least 1"));
        }

        let mut labels = HashSet::new();
        for (ix, source) in self.sources.iter().enumerate() {
            if source.label.trim().is_empty() {
                return Err(ConfigError::invalid(format!("sources[{ix}]: label is empty")));
            }
            if !labels.insert(source.label.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "sources[{ix}]: duplicate label '{}'",
                    source.label
                )));
            }
            if source.sample_rate == 0 {
                return Err(ConfigError::invalid(format!(
                    "sources[{ix}] '{}': sample_rate must be positive",
                    source.label
                )));
            }
            if source.center_freq <= 0 {
                return Err(ConfigError::invalid(format!(
                    "sources[{ix}] '{}': center_freq must be positive",
                    source.label
                )));
            }
            if !source.gain.is_finite() {
                return Err(ConfigError::invalid(format!(
                    "sources[{ix}] '{}': gain must be finite",
                    source.label
                )));
            }
        }

        Ok(())
    }

    /// Parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|_| {
            ConfigError::invalid(format!("listen: '{}' is not a socket address", self.listen))
        })
    }

    /// Registry tuning derived from this config.
    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            max_sessions: self.max_clients,
            heartbeat: (self.heartbeat_secs > 0).then(|| Duration::from_secs(self.heartbeat_secs)),
        }
    }

    /// Monitor period, `None` when disabled.
    pub fn monitor_interval(&self) -> Option<Duration> {
        (self.monitor_secs > 0).then(|| Duration::from_secs(self.monitor_secs))
    }

    /// Builds the source table with loopback drivers.
    pub fn source_table(&self) -> SourceTable {
        let mut table = SourceTable::new();
        for (ix, source) in self.sources.iter().enumerate() {
            let descriptor = SourceDescriptor::new(ix, &source.label, &source.description)
                .with_converter_offset(source.converter_offset)
                .with_default_offset(source.default_offset);
            let driver = LoopbackSource::new(source.center_freq, source.sample_rate)
                .with_gain(source.gain, source.auto_gain);
            table.add(descriptor, Arc::new(driver));
        }
        table
    }

    /// Credential check for `login`.
    pub fn authenticator(&self) -> Arc<dyn Authenticator> {
        match &self.auth {
            Some(auth) => Arc::new(StaticCredentials::new(&auth.username, &auth.password)),
            None => Arc::new(DenyAll),
        }
    }

    /// Assembles the in-process backend the registry drives.
    pub fn loopback_backend(&self) -> Backend {
        Backend {
            graph: Arc::new(LoopbackFlowGraph::new()),
            sources: self.source_table(),
            engines: Arc::new(LoopbackEngineFactory::new()),
            auth: self.authenticator(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config {path}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use tempfile::NamedTempFile;

    fn write_config(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.source_table().labels(), vec!["loopback".to_string()]);
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let file = write_config("");
        assert_eq!(Config::load(file.path()).unwrap(), Config::default());
    }

    #[test]
    fn test_load_full_file() {
        let file = write_config(
            r#"
listen = "127.0.0.1:9000"
max_clients = 8
heartbeat_secs = 0

[auth]
username = "admin"
password = "pw"

[[sources]]
label = "hf"
description = "HF dipole"
center_freq = 7000000
sample_rate = 1024000

[[sources]]
label = "vhf"
description = "2 m"
converter_offset = -100000000
default_offset = 12500
center_freq = 145000000
sample_rate = 2048000
gain = 20.5
auto_gain = true
"#,
        );
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.listen_addr().unwrap().port(), 9000);
        assert_eq!(config.registry_options().max_sessions, 8);
        assert_eq!(config.registry_options().heartbeat, None);
        assert_eq!(config.monitor_interval(), Some(Duration::from_secs(DEFAULT_MONITOR_SECS)));

        let table = config.source_table();
        assert_eq!(table.labels(), vec!["hf".to_string(), "vhf".to_string()]);
        let vhf = table.descriptor(1).unwrap();
        assert_eq!(vhf.converter_offset, -100_000_000);
        assert_eq!(vhf.default_offset, 12_500);
        let driver = table.driver(1).unwrap();
        assert!(driver.gain_mode());
        assert_eq!(driver.center_freq(), 145_000_000);

        let auth = config.authenticator();
        assert!(auth.authenticate("admin", "pw"));
    }

    #[test]
    fn test_missing_auth_denies_login() {
        let config = Config::default();
        assert!(!config.authenticator().authenticate("admin", "admin"));
    }

    #[test]
    fn test_rejects_duplicate_labels() {
        let file = write_config(
            r#"
[[sources]]
label = "a"
[[sources]]
label = "a"
"#,
        );
        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate label"));
    }

    #[test]
    fn test_rejects_zero_sample_rate() {
        let file = write_config("[[sources]]\nlabel = \"a\"\nsample_rate = 0\n");
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_bad_listen() {
        let file = write_config("listen = \"nowhere\"\n");
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_unknown_key() {
        let file = write_config("lisen = \"0.0.0.0:1\"\n");
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/websdr.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_listen_override() {
        let mut config = Config::default();
        config
            .apply_listen_override(Some("127.0.0.1:1234".to_string()))
            .unwrap();
        assert_eq!(config.listen_addr().unwrap().port(), 1234);
        assert!(config.apply_listen_override(Some("bad".to_string())).is_err());
        config.apply_listen_override(None).unwrap();
    }

    #[test]
    fn test_auth_debug_hides_password() {
        let auth = AuthConfig {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{auth:?}").contains("hunter2"));
    }
}
