use thiserror::Error;

/// Top-level error type for the `povrouter-api` crate.
///
/// Covers every failure mode of an obs-websocket session: connecting,
/// the Hello/Identify handshake, request correlation, and decoding.
/// `povrouter-core` maps these into routing outcomes.
#[derive(Debug, Error)]
pub enum Error {
    // ── Connection ──────────────────────────────────────────────────
    /// WebSocket connection could not be established.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed by OBS, with the close code it sent.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// OBS rejected the handshake (wrong or missing password).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The session is not identified yet (or dropped). Retryable.
    #[error("OBS session is not ready")]
    NotReady,

    /// The connection dropped while a request was in flight.
    #[error("OBS connection lost before the response arrived")]
    ConnectionLost,

    /// No answer within the configured deadline.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    // ── Protocol ────────────────────────────────────────────────────
    /// OBS sent something the handshake did not expect.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// OBS answered a request with `requestStatus.result == false`.
    #[error("OBS request {request_type} failed (code {code}): {comment}")]
    Request {
        request_type: String,
        code: u32,
        comment: String,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying on the
    /// next event rather than surfacing.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WebSocketConnect(_)
                | Self::WebSocketClosed { .. }
                | Self::NotReady
                | Self::ConnectionLost
                | Self::Timeout { .. }
        )
    }

    /// Returns `true` if the request never reached OBS because the
    /// session was not usable.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady | Self::ConnectionLost)
    }

    /// The obs-websocket request status code, if this came from a request.
    pub fn request_code(&self) -> Option<u32> {
        match self {
            Self::Request { code, .. } => Some(*code),
            _ => None,
        }
    }
}
