use serde::Deserialize;
use std::path::Path;

const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Connection settings for the cluster control plane.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_token")]
    pub token: Option<String>,

    #[serde(default = "default_insecure")]
    pub insecure_skip_tls_verify: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    std::env::var("WS_CLUSTER_API_URL")
        .unwrap_or_else(|_| "https://kubernetes.default.svc".to_string())
}

fn default_token() -> Option<String> {
    if let Ok(token) = std::env::var("WS_CLUSTER_TOKEN") {
        return Some(token);
    }

    // In-cluster deployments authenticate with the mounted service account
    let path = Path::new(SERVICE_ACCOUNT_TOKEN);
    std::fs::read_to_string(path)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn default_insecure() -> bool {
    std::env::var("WS_CLUSTER_INSECURE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn default_request_timeout() -> u64 {
    std::env::var("WS_CLUSTER_REQUEST_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30)
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: default_token(),
            insecure_skip_tls_verify: default_insecure(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ClusterConfig {
    pub fn from_env() -> Self {
        Self::default()
    }
}
