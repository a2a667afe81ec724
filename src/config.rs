//! Client configuration resolved once at startup.
//!
//! Precedence for every value: explicit override > environment > compiled
//! default. Overrides can be built in code or loaded from a YAML file:
//!
//! ```yaml
//! agent_id: myname/examplebot/v0.1
//! port: 23235
//! connection_timeout_secs: 30
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::{KickoffError, Result};

/// Port the host listens on unless configured otherwise.
pub const DEFAULT_SERVER_PORT: u16 = 23234;

/// How long `connect` keeps retrying before giving up.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Environment variable carrying the agent id assigned by the host.
pub const AGENT_ID_ENV: &str = "RLBOT_AGENT_ID";

/// Environment variable carrying the host port.
pub const SERVER_PORT_ENV: &str = "RLBOT_SERVER_PORT";

/// Explicit configuration values. Unset fields fall through to the
/// environment and then to compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub agent_id: Option<String>,
    pub port: Option<u16>,
    pub connection_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml_ng::from_str(yaml)
            .map_err(|e| KickoffError::parse("client config YAML", e.to_string()))
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| KickoffError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }
}

/// Resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Identity of the agent this process runs. `None` is only valid for
    /// match hosts and observers.
    pub agent_id: Option<String>,
    pub port: u16,
    pub connection_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            agent_id: None,
            port: DEFAULT_SERVER_PORT,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Resolve from the process environment only.
    pub fn from_env() -> Result<Self> {
        Self::resolve(ConfigOverrides::default(), None)
    }

    /// Resolve against the process environment.
    ///
    /// `default_agent_id` is the compiled-in id used when neither the
    /// overrides nor the environment provide one.
    pub fn resolve(overrides: ConfigOverrides, default_agent_id: Option<&str>) -> Result<Self> {
        Self::resolve_with(overrides, default_agent_id, |key| std::env::var(key).ok())
    }

    /// Resolve with a custom environment lookup.
    pub fn resolve_with<F>(
        overrides: ConfigOverrides,
        default_agent_id: Option<&str>,
        lookup: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let agent_id = overrides
            .agent_id
            .or_else(|| lookup(AGENT_ID_ENV))
            .or_else(|| default_agent_id.map(str::to_owned));

        let port = match overrides.port {
            Some(port) => port,
            None => match lookup(SERVER_PORT_ENV) {
                Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                    KickoffError::config(SERVER_PORT_ENV, format!("'{}' is not a port: {}", raw, e))
                })?,
                None => DEFAULT_SERVER_PORT,
            },
        };

        let connection_timeout = overrides
            .connection_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CONNECTION_TIMEOUT);

        debug!(?agent_id, port, ?connection_timeout, "Resolved client configuration");
        Ok(Self { agent_id, port, connection_timeout })
    }

    /// The agent id, required by every agent runtime.
    pub fn require_agent_id(&self) -> Result<&str> {
        self.agent_id.as_deref().ok_or(KickoffError::MissingAgentId)
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_overrides_or_environment() {
        let config =
            ClientConfig::resolve_with(ConfigOverrides::default(), None, env(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert!(matches!(config.require_agent_id(), Err(KickoffError::MissingAgentId)));
    }

    #[test]
    fn environment_beats_compiled_default() {
        let config = ClientConfig::resolve_with(
            ConfigOverrides::default(),
            Some("compiled/default"),
            env(&[(AGENT_ID_ENV, "from/env"), (SERVER_PORT_ENV, "24000")]),
        )
        .unwrap();

        assert_eq!(config.require_agent_id().unwrap(), "from/env");
        assert_eq!(config.port, 24000);
    }

    #[test]
    fn explicit_beats_environment() {
        let overrides = ConfigOverrides {
            agent_id: Some("explicit".to_string()),
            port: Some(25000),
            connection_timeout_secs: Some(5),
        };
        let config = ClientConfig::resolve_with(
            overrides,
            Some("compiled/default"),
            env(&[(AGENT_ID_ENV, "from/env"), (SERVER_PORT_ENV, "not-a-port")]),
        )
        .unwrap();

        assert_eq!(config.agent_id.as_deref(), Some("explicit"));
        assert_eq!(config.port, 25000);
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
    }

    #[test]
    fn compiled_default_used_when_nothing_else_set() {
        let config =
            ClientConfig::resolve_with(ConfigOverrides::default(), Some("a/b/v1"), env(&[]))
                .unwrap();
        assert_eq!(config.require_agent_id().unwrap(), "a/b/v1");
    }

    #[test]
    fn invalid_port_in_environment_is_a_config_error() {
        let err = ClientConfig::resolve_with(
            ConfigOverrides::default(),
            None,
            env(&[(SERVER_PORT_ENV, "70000")]),
        )
        .unwrap_err();
        assert!(matches!(err, KickoffError::Config { ref key, .. } if key == SERVER_PORT_ENV));
    }

    #[test]
    fn overrides_load_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "agent_id: myname/bot/v2\nport: 23300").unwrap();

        let overrides = ConfigOverrides::from_yaml_file(file.path()).unwrap();
        assert_eq!(overrides.agent_id.as_deref(), Some("myname/bot/v2"));
        assert_eq!(overrides.port, Some(23300));
        assert_eq!(overrides.connection_timeout_secs, None);
    }

    #[test]
    fn unknown_yaml_keys_are_rejected() {
        assert!(ConfigOverrides::from_yaml_str("agent: typo").is_err());
    }

    #[test]
    fn missing_yaml_file_is_a_file_error() {
        let err = ConfigOverrides::from_yaml_file("/nonexistent/kickoff.yaml").unwrap_err();
        assert!(matches!(err, KickoffError::File { .. }));
    }
}
