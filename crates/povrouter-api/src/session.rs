//! Supervised obs-websocket session.
//!
//! [`ObsClient::connect`] spawns a background task that owns the socket:
//! it performs the Hello/Identify handshake, forwards requests, correlates
//! responses by `requestId`, and re-establishes the session after a failed
//! connect (`connect_retry`) or an unexpected disconnect (`reconnect_delay`).
//! Readiness is published through a [`watch`] channel so consumers can
//! react to reconnects (scene item ids do not survive them).
//!
//! # Example
//!
//! ```rust,ignore
//! use povrouter_api::{ObsClient, SessionConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = SessionConfig::new("ws://127.0.0.1:4455".parse()?);
//! let client = ObsClient::connect(config, CancellationToken::new());
//!
//! if client.wait_ready(std::time::Duration::from_secs(5)).await {
//!     let items = client.get_scene_item_list("POV_ROUTER").await?;
//!     println!("{} items", items.len());
//! }
//! client.shutdown();
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;
use uuid::Uuid;

use crate::auth::authentication_string;
use crate::error::Error;
use crate::protocol::{self, Incoming, ObsVersion, SceneItemInfo, SceneItemList};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const REQUEST_CHANNEL_CAPACITY: usize = 64;
const RPC_VERSION: u32 = 1;

type Reply = oneshot::Sender<Result<Value, Error>>;
type Pending = HashMap<String, Reply>;
/// Close code OBS uses when the Identify authentication is wrong.
const CLOSE_AUTHENTICATION_FAILED: u16 = 4009;

// ── ConnectionState ──────────────────────────────────────────────────

/// Session state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

// ── SessionConfig ────────────────────────────────────────────────────

/// How to reach OBS and how patiently to retry.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// obs-websocket endpoint, e.g. `ws://127.0.0.1:4455`.
    pub url: Url,
    /// Server password. `None` only works when OBS has auth disabled.
    pub password: Option<SecretString>,
    /// Deadline for the handshake and for every request.
    pub request_timeout: Duration,
    /// Delay before retrying after a failed connect. Default: 2s.
    pub connect_retry: Duration,
    /// Delay before reconnecting after an established session drops. Default: 1s.
    pub reconnect_delay: Duration,
}

impl SessionConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            password: None,
            request_timeout: Duration::from_secs(3),
            connect_retry: Duration::from_secs(2),
            reconnect_delay: Duration::from_secs(1),
        }
    }

    pub fn with_password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }
}

// ── ObsClient ────────────────────────────────────────────────────────

struct OutboundRequest {
    request_type: String,
    data: Value,
    reply: oneshot::Sender<Result<Value, Error>>,
}

/// Handle to a supervised obs-websocket session.
///
/// Cheaply cloneable. All requests funnel through the single session task,
/// so they are never interleaved on the socket.
#[derive(Clone)]
pub struct ObsClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    request_tx: mpsc::Sender<OutboundRequest>,
    state_rx: watch::Receiver<ConnectionState>,
    request_timeout: Duration,
    cancel: CancellationToken,
}

impl ObsClient {
    /// Spawn the session task and return immediately.
    ///
    /// Never fails: connection problems are logged and retried in the
    /// background. Watch [`connection_state`](Self::connection_state) or
    /// call [`wait_ready`](Self::wait_ready) to know when requests will work.
    pub fn connect(config: SessionConfig, cancel: CancellationToken) -> Self {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let request_timeout = config.request_timeout;

        tokio::spawn(session_loop(config, request_rx, state_tx, cancel.clone()));

        Self {
            inner: Arc::new(ClientInner {
                request_tx,
                state_rx,
                request_timeout,
                cancel,
            }),
        }
    }

    /// `true` once the session is identified and until it drops.
    pub fn is_ready(&self) -> bool {
        *self.inner.state_rx.borrow() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// Subscribe to session state transitions.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    /// Wait until the session is identified, up to `timeout`.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let mut rx = self.inner.state_rx.clone();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| *s == ConnectionState::Connected)).await,
            Ok(Ok(_))
        )
    }

    /// Send a raw request and return its `responseData` (or `null`).
    ///
    /// Fails fast with [`Error::NotReady`] while disconnected, and with
    /// [`Error::Timeout`] if OBS does not answer within the request timeout.
    pub async fn call(&self, request_type: &str, data: Value) -> Result<Value, Error> {
        if !self.is_ready() {
            return Err(Error::NotReady);
        }

        let (reply, rx) = oneshot::channel();
        let request = OutboundRequest {
            request_type: request_type.to_owned(),
            data,
            reply,
        };

        let exchange = async {
            self.inner
                .request_tx
                .send(request)
                .await
                .map_err(|_| Error::NotReady)?;
            rx.await.map_err(|_| Error::ConnectionLost)?
        };

        tokio::time::timeout(self.inner.request_timeout, exchange)
            .await
            .map_err(|_| Error::Timeout {
                operation: request_type.to_owned(),
                timeout_ms: millis(self.inner.request_timeout),
            })?
    }

    // ── Typed requests ───────────────────────────────────────────────

    pub async fn get_version(&self) -> Result<ObsVersion, Error> {
        let data = self.call("GetVersion", Value::Null).await?;
        protocol::decode(data)
    }

    /// Top-level items of a scene.
    pub async fn get_scene_item_list(&self, scene: &str) -> Result<Vec<SceneItemInfo>, Error> {
        let data = self
            .call("GetSceneItemList", json!({ "sceneName": scene }))
            .await?;
        protocol::decode::<SceneItemList>(data).map(|list| list.scene_items)
    }

    /// Items nested inside a group. OBS addresses groups by their source name.
    pub async fn get_group_scene_item_list(&self, group: &str) -> Result<Vec<SceneItemInfo>, Error> {
        let data = self
            .call("GetGroupSceneItemList", json!({ "sceneName": group }))
            .await?;
        protocol::decode::<SceneItemList>(data).map(|list| list.scene_items)
    }

    /// Show or hide one scene item. `scene` is the item's direct parent
    /// (the group name for grouped items).
    pub async fn set_scene_item_enabled(
        &self,
        scene: &str,
        scene_item_id: i64,
        enabled: bool,
    ) -> Result<(), Error> {
        self.call(
            "SetSceneItemEnabled",
            json!({
                "sceneName": scene,
                "sceneItemId": scene_item_id,
                "sceneItemEnabled": enabled,
            }),
        )
        .await
        .map(|_| ())
    }

    /// Signal the session task to close the socket and stop retrying.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

// ── Supervisor loop ──────────────────────────────────────────────────

enum ServeEnd {
    Cancelled,
    Closed,
}

/// Main loop: connect → identify → serve → on drop, wait → reconnect.
async fn session_loop(
    config: SessionConfig,
    mut request_rx: mpsc::Receiver<OutboundRequest>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        let _ = state_tx.send(if attempt == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting { attempt }
        });

        let established = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = establish(&config) => result,
        };

        let delay = match established {
            Ok(ws) => {
                let _ = state_tx.send(ConnectionState::Connected);
                info!(url = %config.url, "connected to OBS");

                let end = serve(ws, &mut request_rx, &cancel).await;
                let _ = state_tx.send(ConnectionState::Disconnected);
                if matches!(end, ServeEnd::Cancelled) {
                    break;
                }
                warn!(url = %config.url, "OBS disconnected, reconnecting");
                attempt = 1;
                config.reconnect_delay
            }
            Err(e) => {
                let _ = state_tx.send(ConnectionState::Disconnected);
                if e.is_transient() {
                    warn!(error = %e, attempt, url = %config.url, "OBS connect failed");
                } else {
                    // Retrying will not help until the OBS side changes
                    error!(error = %e, attempt, url = %config.url, "OBS rejected the session");
                }
                attempt = attempt.saturating_add(1);
                config.connect_retry
            }
        };

        // Requests queued while the session was down would carry scene
        // item ids from the previous session; fail them instead.
        while let Ok(stale) = request_rx.try_recv() {
            let _ = stale.reply.send(Err(Error::NotReady));
        }

        debug!(delay_ms = millis(delay), "waiting before reconnect");
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    let _ = state_tx.send(ConnectionState::Disconnected);
    debug!("OBS session loop exiting");
}

// ── Handshake ────────────────────────────────────────────────────────

/// Open the socket and complete Hello → Identify → Identified.
async fn establish(config: &SessionConfig) -> Result<WsStream, Error> {
    debug!(url = %config.url, "connecting to OBS");

    let (mut ws, _response) =
        tokio::time::timeout(config.request_timeout, tokio_tungstenite::connect_async(config.url.as_str()))
            .await
            .map_err(|_| Error::Timeout {
                operation: "connect".into(),
                timeout_ms: millis(config.request_timeout),
            })?
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    let hello = match read_frame(&mut ws, config.request_timeout).await? {
        Incoming::Hello(hello) => hello,
        other => {
            return Err(Error::Protocol(format!(
                "expected Hello (op 0), got op {}",
                other.op()
            )));
        }
    };
    trace!(
        rpc_version = hello.rpc_version,
        server = hello.obs_web_socket_version.as_deref().unwrap_or("unknown"),
        "received Hello"
    );

    let authentication = match &hello.authentication {
        Some(challenge) => {
            let password = config.password.as_ref().ok_or_else(|| Error::Authentication {
                message: "OBS requires a password but none is configured".into(),
            })?;
            Some(authentication_string(
                password.expose_secret(),
                &challenge.salt,
                &challenge.challenge,
            ))
        }
        None => None,
    };

    let identify = protocol::identify_frame(RPC_VERSION, authentication.as_deref(), 0);
    ws.send(Message::text(identify))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    match read_frame(&mut ws, config.request_timeout).await? {
        Incoming::Identified(identified) => {
            debug!(rpc_version = identified.negotiated_rpc_version, "identified with OBS");
            Ok(ws)
        }
        other => Err(Error::Protocol(format!(
            "expected Identified (op 2), got op {}",
            other.op()
        ))),
    }
}

/// Read the next text frame during the handshake, skipping control frames.
async fn read_frame(ws: &mut WsStream, timeout: Duration) -> Result<Incoming, Error> {
    loop {
        let next = tokio::time::timeout(timeout, ws.next())
            .await
            .map_err(|_| Error::Timeout {
                operation: "handshake".into(),
                timeout_ms: millis(timeout),
            })?;

        match next {
            Some(Ok(Message::Text(text))) => return protocol::parse_frame(&text),
            Some(Ok(Message::Close(frame))) => return Err(close_error(frame.as_ref())),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
            None => {
                return Err(Error::WebSocketClosed {
                    code: 1006,
                    reason: "stream ended".into(),
                });
            }
        }
    }
}

fn close_error(frame: Option<&CloseFrame>) -> Error {
    let Some(frame) = frame else {
        return Error::WebSocketClosed {
            code: 1005,
            reason: String::new(),
        };
    };
    let code = u16::from(frame.code);
    let reason = frame.reason.as_str().to_owned();
    if code == CLOSE_AUTHENTICATION_FAILED {
        Error::Authentication { message: reason }
    } else {
        Error::WebSocketClosed { code, reason }
    }
}

// ── Identified session ───────────────────────────────────────────────

/// Pump requests out and responses/events in until the socket drops.
async fn serve(
    ws: WsStream,
    request_rx: &mut mpsc::Receiver<OutboundRequest>,
    cancel: &CancellationToken,
) -> ServeEnd {
    let (mut write, mut read) = ws.split();
    let mut pending = Pending::new();

    let end = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break ServeEnd::Cancelled;
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => dispatch_frame(&text, &mut pending),
                Some(Ok(Message::Close(frame))) => {
                    let err = close_error(frame.as_ref());
                    info!(reason = %err, "OBS closed the connection");
                    break ServeEnd::Closed;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "OBS WebSocket read error");
                    break ServeEnd::Closed;
                }
                None => break ServeEnd::Closed,
            },
            Some(request) = request_rx.recv() => {
                let request_id = Uuid::new_v4().to_string();
                let frame = protocol::request_frame(&request.request_type, &request_id, &request.data);
                trace!(request_type = %request.request_type, %request_id, "sending request");

                if let Err(e) = write.send(Message::text(frame)).await {
                    let _ = request.reply.send(Err(Error::WebSocketConnect(e.to_string())));
                    break ServeEnd::Closed;
                }
                track_pending(&mut pending, request_id, request.reply);
            }
        }
    };

    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(Error::ConnectionLost));
    }
    end
}

/// Record a sent request, dropping slots whose caller stopped waiting.
fn track_pending(pending: &mut Pending, request_id: String, reply: Reply) {
    pending.retain(|_, reply| !reply.is_closed());
    pending.insert(request_id, reply);
}

/// Route one inbound frame of an identified session.
fn dispatch_frame(text: &str, pending: &mut Pending) {
    match protocol::parse_frame(text) {
        Ok(Incoming::RequestResponse(response)) => {
            match pending.remove(&response.request_id) {
                Some(reply) => {
                    let _ = reply.send(response.into_result());
                }
                None => debug!(request_id = %response.request_id, "response for unknown request"),
            }
        }
        Ok(Incoming::Event(event)) => {
            trace!(event_type = %event.event_type, "ignoring OBS event");
        }
        Ok(other) => trace!(op = other.op(), "ignoring frame"),
        Err(e) => debug!(error = %e, "failed to parse OBS frame"),
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    use super::*;

    #[test]
    fn default_session_timings() {
        let config = SessionConfig::new("ws://127.0.0.1:4455".parse().unwrap());
        assert_eq!(config.connect_retry, Duration::from_secs(2));
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
        assert!(config.password.is_none());
    }

    #[test]
    fn auth_close_code_maps_to_authentication_error() {
        let frame = CloseFrame {
            code: CloseCode::from(4009),
            reason: "Authentication failed.".into(),
        };
        assert!(matches!(
            close_error(Some(&frame)),
            Error::Authentication { .. }
        ));
    }

    #[test]
    fn other_close_codes_keep_code() {
        let frame = CloseFrame {
            code: CloseCode::from(4011),
            reason: "Kicked".into(),
        };
        match close_error(Some(&frame)) {
            Error::WebSocketClosed { code, reason } => {
                assert_eq!(code, 4011);
                assert_eq!(reason, "Kicked");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn dispatch_resolves_pending_request() {
        let (tx, mut rx) = oneshot::channel();
        let mut pending = Pending::new();
        pending.insert("req-1".to_owned(), tx);

        let text = r#"{"op":7,"d":{"requestType":"GetSceneItemList","requestId":"req-1","requestStatus":{"result":true,"code":100},"responseData":{"sceneItems":[]}}}"#;
        dispatch_frame(text, &mut pending);

        assert!(pending.is_empty());
        let value = rx.try_recv().unwrap().unwrap();
        assert_eq!(value["sceneItems"], json!([]));
    }

    #[test]
    fn dispatch_leaves_pending_alone_on_events() {
        let (tx, mut rx) = oneshot::channel();
        let mut pending = Pending::new();
        pending.insert("req-1".to_owned(), tx);

        let text = r#"{"op":5,"d":{"eventType":"SceneItemEnableStateChanged","eventIntent":128,"eventData":{"sceneItemId":3}}}"#;
        dispatch_frame(text, &mut pending);

        assert_eq!(pending.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn abandoned_requests_are_pruned() {
        let mut pending = Pending::new();

        // Caller timed out and dropped its receiver
        let (abandoned, rx) = oneshot::channel();
        drop(rx);
        track_pending(&mut pending, "req-1".into(), abandoned);

        let (waiting, _rx) = oneshot::channel();
        track_pending(&mut pending, "req-2".into(), waiting);
        let (next, _next_rx) = oneshot::channel();
        track_pending(&mut pending, "req-3".into(), next);

        let mut ids: Vec<&str> = pending.keys().map(String::as_str).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["req-2", "req-3"]);
    }

    #[tokio::test]
    async fn call_fails_fast_when_not_ready() {
        let cancel = CancellationToken::new();
        let mut config = SessionConfig::new("ws://127.0.0.1:9".parse().unwrap());
        config.connect_retry = Duration::from_secs(60);
        let client = ObsClient::connect(config, cancel.clone());

        let result = client.get_scene_item_list("POV_ROUTER").await;
        assert!(matches!(result, Err(Error::NotReady)));
        assert!(!client.is_ready());

        cancel.cancel();
    }
}
