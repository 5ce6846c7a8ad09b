use serde::Deserialize;
use std::time::Duration;
use url::Url;
use ws_cluster::CleanupPolicy;
use ws_core::error::{InfraError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_machine_start_timeout")]
    pub machine_start_timeout_min: u64,

    #[serde(default = "default_bootstrap_timeout")]
    pub bootstrap_timeout_min: u64,

    #[serde(default = "default_deletion_timeout")]
    pub deletion_timeout_min: u64,

    #[serde(default = "default_server_check_timeout")]
    pub server_check_timeout_secs: u64,

    #[serde(default = "default_server_check_interval")]
    pub server_check_interval_millis: u64,

    /// Accept self-signed certificates when polling https servers.
    #[serde(default = "default_server_check_insecure")]
    pub server_check_insecure: bool,

    /// Fixed namespace for every workspace; the workspace id is used when unset.
    #[serde(default = "default_project_name")]
    pub project_name: Option<String>,

    /// Websocket endpoint that receives runtime output.
    #[serde(default = "default_output_channel")]
    pub output_channel: Option<String>,

    #[serde(default = "default_parallel_machine_start")]
    pub parallel_machine_start: bool,

    #[serde(default = "default_preserve_volume_claims")]
    pub preserve_volume_claims: bool,
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn default_machine_start_timeout() -> u64 {
    env_u64("WS_RUNTIME_MACHINE_START_TIMEOUT", 5)
}

fn default_bootstrap_timeout() -> u64 {
    env_u64("WS_RUNTIME_BOOTSTRAP_TIMEOUT", 5)
}

fn default_deletion_timeout() -> u64 {
    env_u64("WS_RUNTIME_DELETION_TIMEOUT", 2)
}

fn default_server_check_timeout() -> u64 {
    env_u64("WS_RUNTIME_SERVER_CHECK_TIMEOUT", 180)
}

fn default_server_check_interval() -> u64 {
    env_u64("WS_RUNTIME_SERVER_CHECK_INTERVAL", 3000)
}

fn default_server_check_insecure() -> bool {
    env_bool("WS_RUNTIME_SERVER_CHECK_INSECURE", false)
}

fn default_project_name() -> Option<String> {
    env_string("WS_RUNTIME_PROJECT")
}

fn default_output_channel() -> Option<String> {
    env_string("WS_RUNTIME_OUTPUT_CHANNEL")
}

fn default_parallel_machine_start() -> bool {
    env_bool("WS_RUNTIME_PARALLEL_START", true)
}

fn default_preserve_volume_claims() -> bool {
    env_bool("WS_RUNTIME_PRESERVE_VOLUME_CLAIMS", false)
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            machine_start_timeout_min: default_machine_start_timeout(),
            bootstrap_timeout_min: default_bootstrap_timeout(),
            deletion_timeout_min: default_deletion_timeout(),
            server_check_timeout_secs: default_server_check_timeout(),
            server_check_interval_millis: default_server_check_interval(),
            server_check_insecure: default_server_check_insecure(),
            project_name: default_project_name(),
            output_channel: default_output_channel(),
            parallel_machine_start: default_parallel_machine_start(),
            preserve_volume_claims: default_preserve_volume_claims(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn machine_start_timeout(&self) -> Duration {
        Duration::from_secs(self.machine_start_timeout_min * 60)
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_secs(self.bootstrap_timeout_min * 60)
    }

    pub fn server_check_timeout(&self) -> Duration {
        Duration::from_secs(self.server_check_timeout_secs)
    }

    pub fn server_check_interval(&self) -> Duration {
        Duration::from_millis(self.server_check_interval_millis)
    }

    /// Parsed output channel endpoint, when configured.
    pub fn output_channel_url(&self) -> Result<Option<Url>> {
        match self.output_channel.as_deref() {
            Some(raw) => Url::parse(raw).map(Some).map_err(|e| {
                InfraError::Internal(format!("Invalid output channel URL '{}': {}", raw, e))
            }),
            None => Ok(None),
        }
    }

    pub fn cleanup_policy(&self) -> CleanupPolicy {
        CleanupPolicy {
            deletion_timeout: Duration::from_secs(self.deletion_timeout_min * 60),
            preserve_volume_claims: self.preserve_volume_claims,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durations() {
        let config: RuntimeConfig = serde_json::from_str(
            r#"{"machine_start_timeout_min": 1, "deletion_timeout_min": 3, "server_check_interval_millis": 250}"#,
        )
        .unwrap();

        assert_eq!(config.machine_start_timeout(), Duration::from_secs(60));
        assert_eq!(config.server_check_interval(), Duration::from_millis(250));
        assert_eq!(
            config.cleanup_policy().deletion_timeout,
            Duration::from_secs(180)
        );
    }

    #[test]
    fn test_server_check_is_verified_unless_configured() {
        let config: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert!(!config.server_check_insecure);

        let config: RuntimeConfig =
            serde_json::from_str(r#"{"server_check_insecure": true}"#).unwrap();
        assert!(config.server_check_insecure);
    }

    #[test]
    fn test_output_channel_url() {
        let mut config: RuntimeConfig = serde_json::from_str("{}").unwrap();
        config.output_channel = Some("ws://output.example.com/logs".to_string());
        assert_eq!(
            config.output_channel_url().unwrap().unwrap().as_str(),
            "ws://output.example.com/logs"
        );

        config.output_channel = Some("not a url".to_string());
        assert!(config.output_channel_url().is_err());

        config.output_channel = None;
        assert!(config.output_channel_url().unwrap().is_none());
    }
}
