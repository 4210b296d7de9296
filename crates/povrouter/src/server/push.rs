// ── WebSocket push ──
//
// Dashboard clients get the current mapping, roster and routing state
// on connect, then every notification as it is published.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::StreamExt;
use tracing::debug;

use povrouter_core::{Notification, RouterHandle};

use super::SharedState;

pub async fn upgrade(State(state): State<SharedState>, ws: WebSocketUpgrade) -> Response {
    let router = state.router.clone();
    ws.on_upgrade(move |socket| forward(socket, router))
}

async fn send(socket: &mut WebSocket, notification: &Notification) -> Result<(), axum::Error> {
    let text = serde_json::to_string(notification).map_err(axum::Error::new)?;
    socket.send(Message::Text(text)).await
}

async fn forward(mut socket: WebSocket, router: RouterHandle) {
    // Subscribe first so nothing published after the snapshot is lost
    let mut notifications = router.notifications();

    for notification in &router.snapshot().initial_notifications() {
        if send(&mut socket, notification).await.is_err() {
            return;
        }
    }
    debug!("push subscriber connected");

    loop {
        tokio::select! {
            next = notifications.next() => {
                let Some(notification) = next else { break };
                if send(&mut socket, &notification).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("push subscriber disconnected");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde_json::Value;
    use tokio::net::TcpListener;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_util::sync::CancellationToken;

    use crate::server::tests::offline_state;
    use crate::server::{router, serve};

    use super::*;

    async fn next_kind<S>(ws: &mut S) -> String
    where
        S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let WsMessage::Text(text) = msg {
                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                return value["kind"].as_str().unwrap().to_owned();
            }
        }
    }

    #[tokio::test]
    async fn new_subscriber_gets_state_then_live_notifications() {
        let dir = tempfile::tempdir().unwrap();
        let state = offline_state(&dir, None);
        let app = router(state.clone(), None);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        tokio::spawn(serve(listener, app, cancel.clone()));

        let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

        assert_eq!(next_kind(&mut ws).await, "mapping");
        assert_eq!(next_kind(&mut ws).await, "players");
        assert_eq!(next_kind(&mut ws).await, "state");

        state.router.publish(Notification::ping());
        assert_eq!(next_kind(&mut ws).await, "ping");

        cancel.cancel();
    }
}
