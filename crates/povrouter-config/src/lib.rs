//! Configuration for the povrouter binary.
//!
//! TOML file + `POVROUTER_` environment overrides, OBS password
//! resolution (env var, keyring, plaintext), mapping-file persistence,
//! and translation into `povrouter_api::SessionConfig` and
//! `povrouter_core::RouterConfig`. Neither of those crates touches disk.

pub mod mapping;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use povrouter_api::SessionConfig;
use povrouter_core::RouterConfig;

pub use mapping::MappingFile;

/// Keyring service name for stored secrets.
pub const KEYRING_SERVICE: &str = "povrouter";
/// Keyring user under which the OBS password is stored.
pub const KEYRING_OBS_PASSWORD: &str = "obs-password";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid mapping file {}: {source}", path.display())]
    Mapping {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("keyring error: {0}")]
    Keyring(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub obs: ObsSection,

    #[serde(default)]
    pub router: RouterSection,

    #[serde(default)]
    pub server: ServerSection,

    /// Player → source table. Relative paths resolve against the config
    /// file's directory. Default: `mapping.json` next to the config file.
    pub mapping_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObsSection {
    /// obs-websocket endpoint.
    #[serde(default = "default_obs_url")]
    pub url: String,

    /// Password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_connect_retry_ms")]
    pub connect_retry_ms: u64,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl Default for ObsSection {
    fn default() -> Self {
        Self {
            url: default_obs_url(),
            password: None,
            password_env: None,
            request_timeout_ms: default_request_timeout_ms(),
            connect_retry_ms: default_connect_retry_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

fn default_obs_url() -> String {
    "ws://127.0.0.1:4455".into()
}
fn default_request_timeout_ms() -> u64 {
    3000
}
fn default_connect_retry_ms() -> u64 {
    2000
}
fn default_reconnect_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterSection {
    /// Scene whose items are switched.
    #[serde(default = "default_scene")]
    pub scene: String,

    /// Source shown when a mapped source is missing from the scene.
    pub fallback_source: Option<String>,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Prefix identifying player cameras (case-insensitive).
    #[serde(default = "default_camera_prefix")]
    pub camera_prefix: String,

    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,

    /// Only accept 17-digit SteamID64 player ids.
    #[serde(default = "default_true")]
    pub strict_player_ids: bool,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            scene: default_scene(),
            fallback_source: None,
            debounce_ms: default_debounce_ms(),
            camera_prefix: default_camera_prefix(),
            max_nesting_depth: default_max_nesting_depth(),
            strict_player_ids: true,
        }
    }
}

fn default_scene() -> String {
    "POV_ROUTER".into()
}
fn default_debounce_ms() -> u64 {
    150
}
fn default_camera_prefix() -> String {
    "POV_".into()
}
fn default_max_nesting_depth() -> usize {
    1
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSection {
    /// HTTP listen address.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Shared secret expected from the game's GSI config.
    pub gsi_token: Option<String>,

    /// Dashboard assets to serve at `/`.
    pub static_dir: Option<PathBuf>,

    /// Push-channel heartbeat interval. `0` disables it.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            gsi_token: None,
            static_dir: None,
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:3000".into()
}
fn default_heartbeat_secs() -> u64 {
    2
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "povrouter", "povrouter").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("povrouter");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load defaults, then the TOML file at `path`, then `POVROUTER_*` env
/// overrides (`__` separates sections, e.g. `POVROUTER_OBS__URL`).
///
/// A missing file is not an error.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("POVROUTER_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

impl Config {
    /// Copy with the plaintext password masked, for display.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        if cfg.obs.password.is_some() {
            cfg.obs.password = Some("********".into());
        }
        if cfg.server.gsi_token.is_some() {
            cfg.server.gsi_token = Some("********".into());
        }
        cfg
    }

    /// Where the mapping table lives, given the config file location.
    pub fn mapping_path(&self, config_path: &Path) -> PathBuf {
        let base = config_path.parent().unwrap_or_else(|| Path::new("."));
        match &self.mapping_file {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => base.join(path),
            None => base.join("mapping.json"),
        }
    }

    // ── Translation to runtime configs ──────────────────────────────

    /// Build the obs-websocket session config, resolving the password.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let url: url::Url = self.obs.url.parse().map_err(|_| ConfigError::Validation {
            field: "obs.url".into(),
            reason: format!("invalid URL: {}", self.obs.url),
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::Validation {
                field: "obs.url".into(),
                reason: format!("expected a ws:// or wss:// URL, got {}", self.obs.url),
            });
        }
        if self.obs.request_timeout_ms == 0 {
            return Err(ConfigError::Validation {
                field: "obs.request_timeout_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }

        let mut session = SessionConfig::new(url);
        session.password = resolve_obs_password(&self.obs);
        session.request_timeout = Duration::from_millis(self.obs.request_timeout_ms);
        session.connect_retry = Duration::from_millis(self.obs.connect_retry_ms);
        session.reconnect_delay = Duration::from_millis(self.obs.reconnect_delay_ms);
        Ok(session)
    }

    /// Build the routing config.
    pub fn router_config(&self) -> Result<RouterConfig, ConfigError> {
        let router = &self.router;
        if router.scene.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "router.scene".into(),
                reason: "must not be empty".into(),
            });
        }
        if router.camera_prefix.is_empty() {
            return Err(ConfigError::Validation {
                field: "router.camera_prefix".into(),
                reason: "must not be empty (hide-all would hide every source)".into(),
            });
        }

        Ok(RouterConfig {
            scene: router.scene.clone(),
            fallback_source: router
                .fallback_source
                .clone()
                .filter(|s| !s.trim().is_empty()),
            debounce: Duration::from_millis(router.debounce_ms),
            camera_prefix: router.camera_prefix.clone(),
            max_nesting_depth: router.max_nesting_depth,
            strict_player_ids: router.strict_player_ids,
        })
    }
}

// ── Secret resolution ───────────────────────────────────────────────

/// Resolve the OBS password: `password_env` → keyring → plaintext.
///
/// `None` means connect without authentication.
pub fn resolve_obs_password(obs: &ObsSection) -> Option<SecretString> {
    resolve_password_with(
        obs,
        |name| std::env::var(name).ok(),
        || {
            keyring::Entry::new(KEYRING_SERVICE, KEYRING_OBS_PASSWORD)
                .and_then(|entry| entry.get_password())
                .ok()
        },
    )
}

fn resolve_password_with(
    obs: &ObsSection,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn() -> Option<String>,
) -> Option<SecretString> {
    // 1. Env var named by the config
    if let Some(value) = obs.password_env.as_deref().and_then(&env) {
        return Some(SecretString::from(value));
    }

    // 2. System keyring
    if let Some(value) = keyring() {
        return Some(SecretString::from(value));
    }

    // 3. Plaintext in config
    obs.password.clone().map(SecretString::from)
}

/// Store the OBS password in the system keyring.
pub fn store_obs_password(password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, KEYRING_OBS_PASSWORD)
        .and_then(|entry| entry.set_password(password))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}
