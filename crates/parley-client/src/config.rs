//! Client configuration.
//!
//! Loaded from a TOML file before connect. All sections have defaults, so a
//! missing file yields a usable local-development configuration.
//!
//! ```toml
//! url = "wss://assistant.example.com/session"
//! identity = "alice"
//! working_dir = "~/projects/demo"
//!
//! [reconnect]
//! max_attempts = 10
//!
//! [danger]
//! patterns = ["git\\s+push\\s+--force"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Config file location under the user config dir.
const CONFIG_SUBPATH: &str = "parley/client.toml";

/// Connection and policy settings for one client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Session endpoint.
    pub url: String,

    /// User identity presented to the backend.
    pub identity: String,

    /// Opaque credential supplied by the token issuer. Sent as a bearer
    /// header when present; never logged.
    pub credential: Option<String>,

    /// Default working directory for remote-requested commands that do not
    /// name one.
    pub working_dir: Option<String>,

    /// Seconds between heartbeat pings while connected.
    pub heartbeat_interval_secs: u64,

    pub reconnect: ReconnectConfig,

    pub exec: ExecConfig,

    pub danger: DangerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8765/session".to_string(),
            identity: "default".to_string(),
            credential: None,
            working_dir: None,
            heartbeat_interval_secs: 30,
            reconnect: ReconnectConfig::default(),
            exec: ExecConfig::default(),
            danger: DangerConfig::default(),
        }
    }
}

/// Reconnection backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first retry; doubles per attempt.
    pub base_delay_secs: u64,
    /// Ceiling for the per-attempt delay.
    pub max_delay_secs: u64,
    /// Attempts before giving up and requiring a manual reconnect.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: 1,
            max_delay_secs: 30,
            max_attempts: 10,
        }
    }
}

/// Command execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Per-command timeout enforced by the executor.
    pub timeout_secs: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

/// Dangerous-command policy.
///
/// Commands matching a pattern are gated on explicit approval even when the
/// remote marks them `requires_approval = false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DangerConfig {
    /// Extra regexes merged with the built-in pattern set.
    pub patterns: Vec<String>,

    /// Restores pure remote control: locally detected dangerous commands run
    /// without forcing approval.
    pub approve_dangerous_locally: bool,
}

impl ClientConfig {
    /// Loads configuration from `path`, or from
    /// `~/.config/parley/client.toml` when `path` is `None`. A missing file
    /// yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match dirs::config_dir() {
                Some(dir) => dir.join(CONFIG_SUBPATH),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;

        if let Some(dir) = config.working_dir.take() {
            config.working_dir = Some(shellexpand::tilde(&dir).into_owned());
        }

        Ok(config)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec.timeout_secs)
    }

    /// Working directory for a command, preferring the remote-supplied one.
    pub fn resolve_working_dir(&self, remote: Option<&str>) -> PathBuf {
        remote
            .map(|d| PathBuf::from(shellexpand::tilde(d).into_owned()))
            .or_else(|| self.working_dir.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.heartbeat_interval_secs, 30);
        assert_eq!(config.reconnect.max_attempts, 10);
        assert_eq!(config.reconnect.base_delay_secs, 1);
        assert_eq!(config.reconnect.max_delay_secs, 30);
        assert!(!config.danger.approve_dangerous_locally);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "url = \"wss://example.com/s\"\n[reconnect]\nmax_attempts = 3"
        )
        .unwrap();

        let config = ClientConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.url, "wss://example.com/s");
        assert_eq!(config.reconnect.max_attempts, 3);
        // Untouched sections keep defaults.
        assert_eq!(config.reconnect.max_delay_secs, 30);
        assert_eq!(config.exec.timeout_secs, 300);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.identity, "default");
    }

    #[test]
    fn test_resolve_working_dir_prefers_remote() {
        let config = ClientConfig {
            working_dir: Some("/srv/app".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_working_dir(Some("/tmp/task")),
            PathBuf::from("/tmp/task")
        );
        assert_eq!(config.resolve_working_dir(None), PathBuf::from("/srv/app"));
    }
}
