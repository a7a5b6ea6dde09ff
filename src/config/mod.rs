/// Configuration management for flowsync
///
/// Handles the relay server address, the remote automation server connection
/// and the synchronization tuning knobs. Everything comes from environment
/// variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Relay server configuration
    pub server: ServerConfig,
    /// Remote automation server configuration
    pub remote: RemoteConfig,
    /// Synchronization configuration
    pub sync: SyncConfig,
}

/// HTTP/WebSocket relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Remote automation server connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the server, without the `/api/v1` suffix
    pub base_url: String,
    /// Static API key sent on every request
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Workflow downloaded on startup and used when a CLI command omits `--id`
    pub default_workflow_id: Option<String>,
}

/// Synchronization tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Directory holding one `workflow_<id>.json` per workflow
    pub workflows_dir: String,
    /// How long an engine write keeps suppressing watcher events (milliseconds)
    pub echo_grace_ms: u64,
    /// Window for coalescing bursts of filesystem events on one file (milliseconds)
    pub watch_debounce_ms: u64,
    /// Cron expression for remote polling; `None` disables the poller
    /// Format: "sec min hour day month weekday" (e.g., "*/30 * * * * *")
    pub poll_schedule: Option<String>,
}

impl SyncConfig {
    pub fn echo_grace(&self) -> Duration {
        Duration::from_millis(self.echo_grace_ms)
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("FLOWSYNC_HOST", "0.0.0.0"),
                port: std::env::var("FLOWSYNC_PORT")
                    .or_else(|_| std::env::var("PORT"))
                    .ok()
                    .and_then(|port| port.parse().ok())
                    .unwrap_or(3000),
            },
            remote: RemoteConfig {
                base_url: remote_base_url(),
                api_key: env_or("N8N_API_TOKEN", ""),
                default_workflow_id: std::env::var("N8N_WORKFLOW_ID")
                    .ok()
                    .filter(|id| !id.is_empty()),
            },
            sync: SyncConfig {
                workflows_dir: env_or("FLOWSYNC_WORKFLOWS_DIR", "workflows"),
                echo_grace_ms: env_parse("FLOWSYNC_ECHO_GRACE_MS", 2000),
                watch_debounce_ms: env_parse("FLOWSYNC_WATCH_DEBOUNCE_MS", 100),
                poll_schedule: match std::env::var("FLOWSYNC_POLL_SCHEDULE") {
                    Ok(schedule) if schedule.trim().is_empty() => None,
                    Ok(schedule) => Some(schedule),
                    Err(_) => Some("*/30 * * * * *".to_string()),
                },
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// `N8N_BASE_URL` wins; otherwise `N8N_PROTOCOL://N8N_HOST`
fn remote_base_url() -> String {
    if let Ok(url) = std::env::var("N8N_BASE_URL") {
        return url.trim_end_matches('/').to_string();
    }
    let protocol = env_or("N8N_PROTOCOL", "http");
    let host = env_or("N8N_HOST", "localhost:5678");
    format!("{}://{}", protocol, host.trim_end_matches('/'))
}
