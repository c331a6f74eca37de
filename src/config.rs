//! Application configuration loading.
//!
//! One YAML file describes the tool peer to spawn, the model endpoint, and
//! the agent's tuning knobs. String values may reference the environment as
//! `${VAR}` or `${VAR:-default}`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::agent_core::DEFAULT_HISTORY_WINDOW;
use crate::inference::ModelConfig;
use crate::mcp_client::session::{DEFAULT_CALL_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT};
use crate::mcp_client::{ServerConfig, SessionTimeouts};

/// File name searched for when no path is given.
pub const CONFIG_FILE_NAME: &str = "toolchat.yaml";

/// Env var naming the config file explicitly.
pub const CONFIG_ENV_VAR: &str = "TOOLCHAT_CONFIG";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find {CONFIG_FILE_NAME}: {reason}")]
    NotFound { reason: String },

    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── Types ───────────────────────────────────────────────────────────────────

/// Top-level structure of `toolchat.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentSettings,
}

/// Orchestration tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    /// Turns read back from the ledger for prompting.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// SQLite file mirroring the ledger. Unset means in-memory only.
    #[serde(default)]
    pub database: Option<String>,
}

fn default_history_window() -> usize {
    DEFAULT_HISTORY_WINDOW
}
fn default_handshake_timeout_ms() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT.as_millis() as u64
}
fn default_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT.as_millis() as u64
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            database: None,
        }
    }
}

impl AgentSettings {
    pub fn timeouts(&self) -> SessionTimeouts {
        SessionTimeouts {
            handshake: Duration::from_millis(self.handshake_timeout_ms),
            call: Duration::from_millis(self.call_timeout_ms),
        }
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        self.database
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(|p| PathBuf::from(expand_tilde(p)))
    }
}

impl AppConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.command.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "server.command must not be empty".into(),
            });
        }
        if self.model.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "model.base_url must not be empty".into(),
            });
        }
        if self.agent.history_window == 0 {
            return Err(ConfigError::Invalid {
                reason: "agent.history_window must be at least 1".into(),
            });
        }
        if self.agent.handshake_timeout_ms == 0 || self.agent.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "agent timeouts must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Resolve the config file location.
///
/// Order: `explicit`, then `TOOLCHAT_CONFIG`, then `toolchat.yaml` in `start`
/// or any of its ancestors.
pub fn find_config_path(explicit: Option<&Path>, start: &Path) -> Result<PathBuf, ConfigError> {
    // 1. Command-line path
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    // 2. Check env var
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(expand_tilde(&path)));
        }
    }

    // 3. Walk upward from `start`
    search_upward(start).ok_or_else(|| ConfigError::NotFound {
        reason: format!(
            "pass --config, set {CONFIG_ENV_VAR}, or create one in {} or a parent directory",
            start.display()
        ),
    })
}

fn search_upward(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Load, interpolate, parse, and validate the configuration file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut config = parse_config(&raw)?;
    if let Some(cwd) = config.server.cwd.as_mut() {
        *cwd = expand_tilde(cwd);
    }
    Ok(config)
}

fn parse_config(raw: &str) -> Result<AppConfig, ConfigError> {
    let interpolated = interpolate_env_vars(raw);

    let config: AppConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
    config.validate()?;
    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some((var_name, default)) = expr.split_once(":-") {
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
server:
  command: uv
  args: [run, python, mcp_server.py]
model:
  base_url: "http://localhost:11434/v1"
  model_name: llama3.1
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.server.args, vec!["run", "python", "mcp_server.py"]);
        assert_eq!(config.agent.history_window, 5);
        assert_eq!(
            config.agent.timeouts(),
            SessionTimeouts {
                handshake: Duration::from_secs(10),
                call: Duration::from_secs(30),
            }
        );
        assert!(config.agent.database_path().is_none());
    }

    #[test]
    fn test_agent_overrides() {
        let raw = format!(
            "{MINIMAL}agent:\n  history_window: 3\n  call_timeout_ms: 1500\n  database: /tmp/ledger.db\n"
        );
        let config = parse_config(&raw).unwrap();
        assert_eq!(config.agent.history_window, 3);
        assert_eq!(config.agent.timeouts().call, Duration::from_millis(1500));
        assert_eq!(
            config.agent.database_path(),
            Some(PathBuf::from("/tmp/ledger.db"))
        );
    }

    #[test]
    fn test_zero_window_rejected() {
        let raw = format!("{MINIMAL}agent:\n  history_window: 0\n");
        assert!(matches!(
            parse_config(&raw),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_missing_server_is_parse_error() {
        let raw = "model:\n  base_url: http://x\n  model_name: m\n";
        assert!(matches!(parse_config(raw), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_env_interpolation_in_config() {
        std::env::set_var("__TOOLCHAT_TEST_MODEL__", "qwen2.5");
        std::env::remove_var("__TOOLCHAT_TEST_UNSET__");
        let raw = r#"
server:
  command: uv
model:
  base_url: "${__TOOLCHAT_TEST_UNSET__:-http://localhost:8080/v1}"
  model_name: "${__TOOLCHAT_TEST_MODEL__}"
"#;
        let config = parse_config(raw).unwrap();
        assert_eq!(config.model.base_url, "http://localhost:8080/v1");
        assert_eq!(config.model.model_name, "qwen2.5");
        std::env::remove_var("__TOOLCHAT_TEST_MODEL__");
    }

    #[test]
    fn test_interpolate_no_vars() {
        let input = "plain text with no variables";
        assert_eq!(interpolate_env_vars(input), input);
    }

    #[test]
    fn test_expand_tilde() {
        let result = expand_tilde("~/ledger.db");
        assert!(!result.starts_with('~'));
        assert!(result.ends_with("/ledger.db"));
        assert_eq!(expand_tilde("/abs/path"), "/abs/path");
    }

    #[test]
    fn test_search_upward_finds_ancestor_config() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), MINIMAL).unwrap();

        let found = search_upward(&nested).unwrap();
        assert_eq!(found, dir.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_explicit_path_wins() {
        let explicit = Path::new("/etc/toolchat/custom.yaml");
        let found = find_config_path(Some(explicit), Path::new("/")).unwrap();
        assert_eq!(found, explicit);
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let raw = MINIMAL.replace(
            "  args: [run, python, mcp_server.py]\n",
            "  args: [run, python, mcp_server.py]\n  cwd: ~/peers\n",
        );
        std::fs::write(&path, raw).unwrap();

        let config = load_config(&path).unwrap();
        let cwd = config.server.cwd.unwrap();
        assert!(!cwd.starts_with('~'));
        assert!(cwd.ends_with("/peers"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/toolchat.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
