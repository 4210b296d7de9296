// ── Core error types ──
//
// Domain errors for the routing engine. Callers never see raw
// obs-websocket frames or close codes; the `From<povrouter_api::Error>`
// impl folds transport failures into the routing taxonomy.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session ──────────────────────────────────────────────────────
    /// OBS is not connected. The switch is skipped; the next event retries.
    #[error("OBS session is not ready")]
    SessionNotReady,

    #[error("OBS connection error: {reason}")]
    Connection { reason: String },

    #[error("OBS request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Routing ──────────────────────────────────────────────────────
    #[error("Failed to fetch topology of scene {scene}: {reason}")]
    TopologyFetchFailed { scene: String, reason: String },

    #[error("Source {source_name} not found in scene {scene}")]
    TargetNotFound { source_name: String, scene: String },

    #[error("Failed to toggle {source_name}: {reason}")]
    ToggleFailed { source_name: String, reason: String },

    // ── Remote ───────────────────────────────────────────────────────
    #[error("OBS rejected the request: {message}")]
    Remote {
        message: String,
        /// obs-websocket request status code.
        code: Option<u32>,
    },

    // ── Engine ───────────────────────────────────────────────────────
    #[error("Routing worker is not running")]
    RouterUnavailable,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// `true` for failures that clear up on their own once OBS is back.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SessionNotReady | Self::Connection { .. } | Self::Timeout { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<povrouter_api::Error> for CoreError {
    fn from(err: povrouter_api::Error) -> Self {
        use povrouter_api::Error as Api;

        match err {
            Api::NotReady | Api::ConnectionLost => CoreError::SessionNotReady,
            Api::WebSocketConnect(reason) => CoreError::Connection { reason },
            Api::WebSocketClosed { code, reason } => CoreError::Connection {
                reason: format!("closed with code {code}: {reason}"),
            },
            Api::Authentication { message } => CoreError::Connection {
                reason: format!("authentication failed: {message}"),
            },
            Api::Timeout { timeout_ms, .. } => CoreError::Timeout { timeout_ms },
            Api::Request {
                request_type,
                code,
                comment,
            } => CoreError::Remote {
                message: format!("{request_type}: {comment}"),
                code: Some(code),
            },
            Api::Protocol(message) => CoreError::Internal(message),
            Api::Deserialization { message, .. } => {
                CoreError::Internal(format!("unexpected OBS payload: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_maps_to_session_not_ready() {
        let err: CoreError = povrouter_api::Error::NotReady.into();
        assert!(matches!(err, CoreError::SessionNotReady));
        assert!(err.is_retryable());

        let err: CoreError = povrouter_api::Error::ConnectionLost.into();
        assert!(matches!(err, CoreError::SessionNotReady));
    }

    #[test]
    fn request_failure_keeps_status_code() {
        let err: CoreError = povrouter_api::Error::Request {
            request_type: "SetSceneItemEnabled".into(),
            code: 600,
            comment: "No scene items were found".into(),
        }
        .into();

        match err {
            CoreError::Remote { code, message } => {
                assert_eq!(code, Some(600));
                assert!(message.starts_with("SetSceneItemEnabled"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn timeout_is_retryable() {
        let err: CoreError = povrouter_api::Error::Timeout {
            operation: "GetSceneItemList".into(),
            timeout_ms: 3000,
        }
        .into();
        assert!(matches!(err, CoreError::Timeout { timeout_ms: 3000 }));
        assert!(err.is_retryable());
    }
}
