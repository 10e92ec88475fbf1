//! # Bridge Configuration
//!
//! Configuration for the bridge server, the external clients and the replay
//! worker.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     FISCAL_BRIDGE_WEBHOOK_SECRET=...                                   │
//! │     FISCAL_BRIDGE_PORT=8080                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/fiscal-bridge/bridge.toml (Linux)                        │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0"
//! port = 8080
//!
//! [database]
//! path = "/var/lib/fiscal-bridge/bridge.db"
//! max_connections = 5
//!
//! [commerce]
//! webhook_secret = "shpss_..."
//! api_version = "2024-10"
//!
//! [fiscal]
//! base_url = "https://api.bsale.cl/v1"
//!
//! [http]
//! timeout_secs = 30
//!
//! [replay]
//! poll_interval_secs = 30
//! batch_size = 50
//! max_attempts = 5
//! initial_backoff_secs = 60
//! max_backoff_secs = 3600
//! stale_after_secs = 600
//!
//! [admin]
//! token = "change-me"
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Server Settings
// =============================================================================

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

// =============================================================================
// Database Settings
// =============================================================================

/// SQLite settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// External Service Settings
// =============================================================================

/// Commerce platform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommerceSettings {
    /// App secret used to sign webhooks (HMAC-SHA256).
    #[serde(default)]
    pub webhook_secret: String,

    /// Admin REST API version segment.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Replaces `https://{shop_domain}` as the Admin API origin.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_api_version() -> String {
    "2024-10".to_string()
}

impl Default for CommerceSettings {
    fn default() -> Self {
        CommerceSettings {
            webhook_secret: String::new(),
            api_version: default_api_version(),
            base_url: None,
        }
    }
}

/// Fiscal service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiscalSettings {
    #[serde(default = "default_fiscal_base_url")]
    pub base_url: String,
}

fn default_fiscal_base_url() -> String {
    "https://api.bsale.cl/v1".to_string()
}

impl Default for FiscalSettings {
    fn default() -> Self {
        FiscalSettings {
            base_url: default_fiscal_base_url(),
        }
    }
}

/// Outbound HTTP behavior shared by both clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Per-request timeout. A timeout is a transient failure.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Initial delay between transport-level retries (milliseconds).
    #[serde(default = "default_retry_initial")]
    pub retry_initial_ms: u64,

    /// Total time budget for transport-level retries (seconds).
    #[serde(default = "default_retry_budget")]
    pub retry_budget_secs: u64,
}

fn default_timeout() -> u64 {
    30
}
fn default_retry_initial() -> u64 {
    200
}
fn default_retry_budget() -> u64 {
    5
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            timeout_secs: default_timeout(),
            retry_initial_ms: default_retry_initial(),
            retry_budget_secs: default_retry_budget(),
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Replay Settings
// =============================================================================

/// Replay worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between polls of the ledger (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Events replayed per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Replays per event before it is left failed for good.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first replay (seconds); doubles per attempt.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: u64,

    /// Upper bound of the replay delay (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// A `pending`/`processing` event untouched for this long is treated
    /// as abandoned and replayed (seconds).
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_poll_interval() -> u64 {
    30
}
fn default_batch_size() -> u32 {
    50
}
fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff() -> u64 {
    60
}
fn default_max_backoff() -> u64 {
    3600
}
fn default_stale_after() -> u64 {
    600
}

impl Default for ReplaySettings {
    fn default() -> Self {
        ReplaySettings {
            enabled: true,
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            initial_backoff_secs: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            stale_after_secs: default_stale_after(),
        }
    }
}

impl ReplaySettings {
    /// Delay before the replay following `retry_count` previous replays:
    /// `initial * 2^retry_count`, capped at `max`.
    pub fn backoff_for(&self, retry_count: i64) -> Duration {
        let exponent = retry_count.clamp(0, 30) as u32;
        let secs = self
            .initial_backoff_secs
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_secs);
        Duration::from_secs(secs)
    }

    /// Claims last touched before this instant count as abandoned.
    pub fn stale_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        // Capped at ten years so the subtraction cannot overflow.
        let secs = self.stale_after_secs.min(315_360_000) as i64;
        now - chrono::Duration::seconds(secs)
    }
}

// =============================================================================
// Admin Settings
// =============================================================================

/// Admin API settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminSettings {
    /// Bearer token for `/api/*`. Admin routes reject everything when unset.
    #[serde(default)]
    pub token: Option<String>,
}

// =============================================================================
// Main Bridge Configuration
// =============================================================================

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub commerce: CommerceSettings,

    #[serde(default)]
    pub fiscal: FiscalSettings,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub replay: ReplaySettings,

    #[serde(default)]
    pub admin: AdminSettings,
}

impl BridgeConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (bridge.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading bridge config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.commerce.webhook_secret.is_empty() {
            return Err(SyncError::Config(
                "commerce.webhook_secret must be set".into(),
            ));
        }

        check_http_url("fiscal.base_url", &self.fiscal.base_url)?;
        if let Some(ref url) = self.commerce.base_url {
            check_http_url("commerce.base_url", url)?;
        }

        if self.http.timeout_secs == 0 {
            return Err(SyncError::Config(
                "http.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.replay.poll_interval_secs == 0 {
            return Err(SyncError::Config(
                "replay.poll_interval_secs must be greater than 0".into(),
            ));
        }

        if self.replay.initial_backoff_secs == 0 || self.replay.max_backoff_secs == 0 {
            return Err(SyncError::Config(
                "replay.initial_backoff_secs and replay.max_backoff_secs must be greater than 0"
                    .into(),
            ));
        }

        if self.replay.stale_after_secs <= self.http.timeout_secs {
            return Err(SyncError::Config(
                "replay.stale_after_secs must exceed http.timeout_secs".into(),
            ));
        }

        if self.replay.batch_size == 0 || self.replay.max_attempts == 0 {
            return Err(SyncError::Config(
                "replay.batch_size and replay.max_attempts must be greater than 0".into(),
            ));
        }

        if self.replay.initial_backoff_secs > self.replay.max_backoff_secs {
            return Err(SyncError::Config(
                "replay.initial_backoff_secs exceeds replay.max_backoff_secs".into(),
            ));
        }

        Ok(())
    }

    /// Applies `FISCAL_BRIDGE_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = lookup("FISCAL_BRIDGE_WEBHOOK_SECRET") {
            self.commerce.webhook_secret = secret;
        }

        if let Some(token) = lookup("FISCAL_BRIDGE_ADMIN_TOKEN") {
            self.admin.token = Some(token);
        }

        if let Some(addr) = lookup("FISCAL_BRIDGE_BIND_ADDR") {
            self.server.bind_addr = addr;
        }

        if let Some(port) = lookup("FISCAL_BRIDGE_PORT") {
            match port.parse::<u16>() {
                Ok(p) => {
                    debug!(port = p, "Overriding port from environment");
                    self.server.port = p;
                }
                Err(_) => warn!(port = %port, "Ignoring invalid FISCAL_BRIDGE_PORT"),
            }
        }

        if let Some(path) = lookup("FISCAL_BRIDGE_DATABASE_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(url) = lookup("FISCAL_BRIDGE_FISCAL_URL") {
            debug!(url = %url, "Overriding fiscal base URL from environment");
            self.fiscal.base_url = url;
        }

        if let Some(url) = lookup("FISCAL_BRIDGE_COMMERCE_URL") {
            self.commerce.base_url = Some(url);
        }

        if let Some(version) = lookup("FISCAL_BRIDGE_COMMERCE_API_VERSION") {
            self.commerce.api_version = version;
        }

        if let Some(timeout) = lookup("FISCAL_BRIDGE_HTTP_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.http.timeout_secs = secs;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("cl", "fiscal-bridge", "fiscal-bridge")
            .map(|dirs| dirs.config_dir().join("bridge.toml"))
    }

    /// Resolved database file path.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .or_else(|| {
                directories::ProjectDirs::from("cl", "fiscal-bridge", "fiscal-bridge")
                    .map(|dirs| dirs.data_dir().join("bridge.db"))
            })
            .unwrap_or_else(|| PathBuf::from("bridge.db"))
    }
}

fn check_http_url(field: &str, raw: &str) -> SyncResult<()> {
    let url = Url::parse(raw).map_err(|e| SyncError::Config(format!("{field}: {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SyncError::Config(format!(
            "{field} must start with http:// or https://, got: {raw}"
        )));
    }
    Ok(())
}
