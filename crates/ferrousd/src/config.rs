//! Configuration management for ferrousd.
//!
//! Loads settings from /etc/ferrous/config.toml, then the per-user config
//! directory, or falls back to defaults.

use anyhow::{Context, Result};
use ferrous_shared::{CommandKind, DEFAULT_PORT, DEFAULT_VOLUME_STEP, VOLUME_REPOLL_DELAY};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// System-wide config file path
pub const CONFIG_PATH: &str = "/etc/ferrous/config.toml";

/// Directory name under the user config dir
pub const USER_CONFIG_DIR: &str = "ferrous-control";

/// Upper bound on a server-side confirmation for network callers when no
/// explicit timeout is configured.
pub const NETWORK_CONFIRMATION_FALLBACK_SECS: u64 = 30;

/// Network endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind; 0.0.0.0 makes the endpoint LAN-reachable
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Resolve and show the LAN address on startup
    #[serde(default = "default_advertise")]
    pub advertise: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_advertise() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            advertise: default_advertise(),
        }
    }
}

/// What `POST /api/restart` does on this deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartRoute {
    Restart,
    Sleep,
}

impl RestartRoute {
    pub fn command_kind(&self) -> CommandKind {
        match self {
            RestartRoute::Restart => CommandKind::Restart,
            RestartRoute::Sleep => CommandKind::Sleep,
        }
    }
}

/// Power command configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerConfig {
    /// Delay the OS waits before a scheduled shutdown fires
    #[serde(default = "default_shutdown_delay")]
    pub shutdown_delay_secs: u64,

    /// Bound on every platform call
    #[serde(default = "default_platform_timeout")]
    pub platform_timeout_secs: u64,

    /// Time a cancelled or executed shutdown stays visible before going idle
    #[serde(default = "default_reset_grace")]
    pub reset_grace_secs: u64,

    #[serde(default = "default_restart_route")]
    pub restart_route: RestartRoute,

    /// Use the in-memory platform instead of OS commands
    #[serde(default)]
    pub simulate: bool,
}

fn default_shutdown_delay() -> u64 {
    60
}

fn default_platform_timeout() -> u64 {
    10
}

fn default_reset_grace() -> u64 {
    5
}

fn default_restart_route() -> RestartRoute {
    RestartRoute::Restart
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            shutdown_delay_secs: default_shutdown_delay(),
            platform_timeout_secs: default_platform_timeout(),
            reset_grace_secs: default_reset_grace(),
            restart_route: default_restart_route(),
            simulate: false,
        }
    }
}

/// Confirmation gate configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Seconds before an unanswered confirmation is rejected (0 = wait forever)
    #[serde(default)]
    pub timeout_secs: u64,

    /// Gate network-originated destructive commands on the local confirmation
    /// too, instead of trusting the remote browser's own prompt
    #[serde(default)]
    pub require_for_network: bool,
}

impl ConfirmationConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Network callers never wait unbounded on a human they cannot see.
    pub fn network_timeout(&self) -> Duration {
        self.timeout()
            .unwrap_or(Duration::from_secs(NETWORK_CONFIRMATION_FALLBACK_SECS))
    }
}

/// Volume configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    #[serde(default = "default_volume_step")]
    pub step: i32,

    /// Advertised read-after-write delay for volume snapshots
    #[serde(default = "default_repoll_delay")]
    pub repoll_delay_ms: u64,
}

fn default_volume_step() -> i32 {
    DEFAULT_VOLUME_STEP
}

fn default_repoll_delay() -> u64 {
    VOLUME_REPOLL_DELAY.as_millis() as u64
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            step: default_volume_step(),
            repoll_delay_ms: default_repoll_delay(),
        }
    }
}

/// Request hygiene limits for the network endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,

    /// Requests allowed per peer inside one burst window
    #[serde(default = "default_burst_requests")]
    pub burst_requests: usize,

    #[serde(default = "default_burst_window")]
    pub burst_window_secs: u64,

    #[serde(default = "default_idempotency_ttl")]
    pub idempotency_ttl_secs: u64,

    #[serde(default = "default_idempotency_capacity")]
    pub idempotency_capacity: usize,
}

fn default_max_body() -> usize {
    16 * 1024
}

fn default_burst_requests() -> usize {
    20
}

fn default_burst_window() -> u64 {
    10
}

fn default_idempotency_ttl() -> u64 {
    60
}

fn default_idempotency_capacity() -> usize {
    256
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body(),
            burst_requests: default_burst_requests(),
            burst_window_secs: default_burst_window(),
            idempotency_ttl_secs: default_idempotency_ttl(),
            idempotency_capacity: default_idempotency_capacity(),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub power: PowerConfig,

    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    #[serde(default)]
    pub volume: VolumeConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Config {
    /// Load config from an explicit path, the system path, the user path,
    /// or return defaults.
    ///
    /// An explicit path that fails to load is an error; the implicit
    /// locations fall back silently.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        let candidates = std::iter::once(PathBuf::from(CONFIG_PATH)).chain(Self::user_path());
        for path in candidates {
            if path.exists() {
                match Self::load_from_path(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => warn!("Ignoring unreadable config {}: {:#}", path.display(), e),
                }
            }
        }

        warn!("Config not found, using defaults");
        Ok(Config::default())
    }

    /// Per-user config location
    pub fn user_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(USER_CONFIG_DIR).join("config.toml"))
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write the default config (for first-run setup)
    pub fn save_default(path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(&Config::default())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        info!("Saved default config to {}", path.display());
        Ok(())
    }

    pub fn platform_timeout(&self) -> Duration {
        Duration::from_secs(self.power.platform_timeout_secs.max(1))
    }

    pub fn shutdown_delay(&self) -> Duration {
        Duration::from_secs(self.power.shutdown_delay_secs)
    }

    pub fn reset_grace(&self) -> Duration {
        Duration::from_secs(self.power.reset_grace_secs)
    }

    pub fn repoll_delay(&self) -> Duration {
        Duration::from_millis(self.volume.repoll_delay_ms)
    }
}
