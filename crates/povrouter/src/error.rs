//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use povrouter_config::ConfigError;
use povrouter_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to OBS at {url}")]
    #[diagnostic(
        code(povrouter::connection_failed),
        help(
            "Check that OBS is running with the WebSocket server enabled\n\
             (Tools > WebSocket Server Settings) and that obs.url points at it.\n\
             A rejected password looks the same; run with -v to see the handshake\n\
             and store the right one with: povrouter config set-password"
        )
    )]
    ConnectionFailed { url: String },

    #[error("Could not bind {addr}")]
    #[diagnostic(
        code(povrouter::bind_failed),
        help("Pick another address with --listen or server.listen.")
    )]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // ── OBS ──────────────────────────────────────────────────────────

    #[error("Scene '{scene}' has no items")]
    #[diagnostic(
        code(povrouter::scene_empty),
        help("Check router.scene; scene names are case-sensitive.")
    )]
    SceneEmpty { scene: String },

    #[error("OBS request failed: {message}")]
    #[diagnostic(code(povrouter::obs_error))]
    Obs { message: String },

    #[error("Request timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(povrouter::timeout),
        help("Raise obs.request_timeout_ms or check that OBS is responsive.")
    )]
    Timeout { timeout_ms: u64 },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(povrouter::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(povrouter::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(povrouter::config))]
    Config(Box<ConfigError>),

    // ── IO ───────────────────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Bind { .. } => exit_code::CONNECTION,
            Self::SceneEmpty { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::ConfigExists { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(Box::new(other)),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::SessionNotReady | CoreError::Connection { .. } => Self::ConnectionFailed {
                url: "(disconnected)".into(),
            },
            CoreError::Timeout { timeout_ms } => Self::Timeout { timeout_ms },
            other => Self::Obs {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation_is_a_usage_error() {
        let err = CliError::from(ConfigError::Validation {
            field: "obs.url".into(),
            reason: "expected a ws:// or wss:// URL".into(),
        });
        assert!(matches!(err, CliError::Validation { .. }));
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }

    #[test]
    fn core_errors_map_to_exit_codes() {
        assert_eq!(
            CliError::from(CoreError::SessionNotReady).exit_code(),
            exit_code::CONNECTION
        );
        assert_eq!(
            CliError::from(CoreError::Timeout { timeout_ms: 3000 }).exit_code(),
            exit_code::TIMEOUT
        );
        assert_eq!(
            CliError::from(CoreError::RouterUnavailable).exit_code(),
            exit_code::GENERAL
        );
    }
}
