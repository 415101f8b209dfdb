//! Client configuration loading and validation

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::types::ExecutionMode;

/// Configuration for one server session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Machine id, stable across versions
    pub id: String,
    /// Human-readable display name
    pub name: String,
    /// Artifact location relative to the install root
    pub artifact: PathBuf,
    /// How the artifact is executed
    pub mode: ExecutionMode,
    /// Glob patterns whose changes are forwarded to this session
    pub watch: Vec<String>,
    /// Whether deactivation awaits this session's stop
    #[serde(default)]
    pub await_on_stop: bool,
}

/// Configuration for the whole editor integration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Language identifier for the document scope filter
    pub language: String,
    /// Server sessions, in registration order
    pub sessions: Vec<SessionConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            language: "solidity".to_string(),
            sessions: vec![
                SessionConfig {
                    id: "osmium-solidity".to_string(),
                    name: "Osmium Solidity Language Server".to_string(),
                    artifact: PathBuf::from("dist/server"),
                    mode: ExecutionMode::Module,
                    watch: vec!["**/.solidhunter.json".to_string()],
                    await_on_stop: true,
                },
                SessionConfig {
                    id: "osmium-foundry".to_string(),
                    name: "Osmium Foundry Language Server".to_string(),
                    artifact: PathBuf::from("dist/foundry-server"),
                    mode: ExecutionMode::Binary,
                    watch: vec!["**/foundry.toml".to_string()],
                    await_on_stop: false,
                },
            ],
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading client configuration");
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("failed to read config file: {}", e)))?;
        Self::load_from_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| ClientError::Config(format!("failed to parse YAML: {}", e)))?;
        config.validate()?;
        info!(sessions = config.sessions.len(), "client configuration loaded");
        Ok(config)
    }

    /// Validate the configuration schema
    pub fn validate(&self) -> Result<()> {
        if self.language.is_empty() {
            return Err(ClientError::Config("language must not be empty".to_string()));
        }
        if self.sessions.is_empty() {
            return Err(ClientError::Config(
                "at least one session must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for session in &self.sessions {
            if session.id.is_empty() {
                return Err(ClientError::Config("session id must not be empty".to_string()));
            }
            if session.name.is_empty() {
                return Err(ClientError::Config(format!(
                    "session '{}' has an empty display name",
                    session.id
                )));
            }
            if !seen.insert(session.id.as_str()) {
                return Err(ClientError::Config(format!(
                    "duplicate session id: '{}'",
                    session.id
                )));
            }
            if session.watch.is_empty() {
                return Err(ClientError::Config(format!(
                    "session '{}' has no watch patterns",
                    session.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        config.validate().unwrap();

        assert_eq!(config.language, "solidity");
        assert_eq!(config.sessions.len(), 2);

        let core = &config.sessions[0];
        assert_eq!(core.id, "osmium-solidity");
        assert_eq!(core.name, "Osmium Solidity Language Server");
        assert_eq!(core.mode, ExecutionMode::Module);
        assert_eq!(core.watch, vec!["**/.solidhunter.json".to_string()]);
        assert!(core.await_on_stop);

        let foundry = &config.sessions[1];
        assert_eq!(foundry.id, "osmium-foundry");
        assert_eq!(foundry.name, "Osmium Foundry Language Server");
        assert_eq!(foundry.mode, ExecutionMode::Binary);
        assert_eq!(foundry.watch, vec!["**/foundry.toml".to_string()]);
        assert!(!foundry.await_on_stop);
    }

    #[test]
    fn test_load_from_yaml() {
        let yaml = r#"
language: solidity
sessions:
  - id: osmium-solidity
    name: Osmium Solidity Language Server
    artifact: dist/server
    mode: module
    watch:
      - "**/.solidhunter.json"
    await_on_stop: true
  - id: osmium-foundry
    name: Osmium Foundry Language Server
    artifact: dist/foundry-server
    mode: binary
    watch:
      - "**/foundry.toml"
"#;
        let config = ClientConfig::load_from_str(yaml).unwrap();
        assert_eq!(config.sessions.len(), 2);
        assert_eq!(config.sessions[1].mode, ExecutionMode::Binary);
        assert!(!config.sessions[1].await_on_stop);
    }

    #[test]
    fn test_duplicate_session_ids_rejected() {
        let mut config = ClientConfig::default();
        config.sessions[1].id = config.sessions[0].id.clone();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_empty_watch_patterns_rejected() {
        let mut config = ClientConfig::default();
        config.sessions[0].watch.clear();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_config_round_trips_through_yaml() {
        let config = ClientConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let reloaded = ClientConfig::load_from_str(&yaml).unwrap();
        assert_eq!(reloaded.sessions[0].id, config.sessions[0].id);
        assert_eq!(reloaded.sessions[1].artifact, config.sessions[1].artifact);
    }
}
