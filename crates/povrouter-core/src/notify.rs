// ── Outbound notifications ──
//
// Tagged records pushed to every dashboard subscriber. A `watch`
// snapshot mirrors the latest of each kind so a new subscriber can be
// brought up to date before it starts receiving the broadcast.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::model::{Mapping, PlayerId};
use crate::roster::PlayerSighting;
use crate::router::RouterPhase;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Notification {
    Players {
        players: Vec<PlayerSighting>,
    },
    State {
        last_routed_player: Option<PlayerId>,
        phase: RouterPhase,
    },
    Mapping {
        mapping: Mapping,
    },
    /// Liveness heartbeat.
    Ping {
        #[serde(with = "chrono::serde::ts_milliseconds")]
        time: DateTime<Utc>,
    },
}

impl Notification {
    pub fn ping() -> Self {
        Self::Ping { time: Utc::now() }
    }
}

/// Latest routing state as seen by observers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouterSnapshot {
    pub phase: RouterPhase,
    pub last_routed_player: Option<PlayerId>,
    pub mapping: Mapping,
    pub players: Vec<PlayerSighting>,
}

impl RouterSnapshot {
    fn apply(&mut self, notification: &Notification) {
        match notification {
            Notification::Players { players } => self.players.clone_from(players),
            Notification::State {
                last_routed_player,
                phase,
            } => {
                self.last_routed_player.clone_from(last_routed_player);
                self.phase = phase.clone();
            }
            Notification::Mapping { mapping } => self.mapping.clone_from(mapping),
            Notification::Ping { .. } => {}
        }
    }

    /// What a freshly connected observer is sent first.
    pub fn initial_notifications(&self) -> [Notification; 3] {
        [
            Notification::Mapping {
                mapping: self.mapping.clone(),
            },
            Notification::Players {
                players: self.players.clone(),
            },
            Notification::State {
                last_routed_player: self.last_routed_player.clone(),
                phase: self.phase.clone(),
            },
        ]
    }
}

/// Broadcast fan-out plus the mirrored snapshot.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Arc<Notification>>,
    snapshot: Arc<watch::Sender<RouterSnapshot>>,
}

impl Notifier {
    pub fn new(capacity: usize, initial: RouterSnapshot) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        let (snapshot, _) = watch::channel(initial);
        Self {
            tx,
            snapshot: Arc::new(snapshot),
        }
    }

    /// Update the snapshot, then broadcast. Having no subscribers is fine.
    pub fn publish(&self, notification: Notification) {
        self.snapshot.send_modify(|s| s.apply(&notification));
        let _ = self.tx.send(Arc::new(notification));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Notification>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> RouterSnapshot {
        self.snapshot.borrow().clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn notifications_are_tagged_by_kind() {
        let state = Notification::State {
            last_routed_player: Some("76561198000000001".into()),
            phase: RouterPhase::Routed("76561198000000001".into()),
        };
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({
                "kind": "state",
                "last_routed_player": "76561198000000001",
                "phase": { "state": "routed", "player": "76561198000000001" }
            })
        );

        let mut mapping = Mapping::new();
        mapping.insert("76561198000000001".into(), "POV_Alice".into());
        assert_eq!(
            serde_json::to_value(Notification::Mapping { mapping }).unwrap(),
            json!({ "kind": "mapping", "mapping": { "76561198000000001": "POV_Alice" } })
        );

        let ping = serde_json::to_value(Notification::ping()).unwrap();
        assert_eq!(ping["kind"], "ping");
        assert!(ping["time"].is_i64());
    }

    #[test]
    fn publish_updates_snapshot() {
        let notifier = Notifier::new(8, RouterSnapshot::default());
        let mut rx = notifier.subscribe();

        notifier.publish(Notification::State {
            last_routed_player: Some("76561198000000002".into()),
            phase: RouterPhase::Routed("76561198000000002".into()),
        });
        notifier.publish(Notification::ping());

        let snapshot = notifier.current();
        assert_eq!(
            snapshot.last_routed_player,
            Some(PlayerId::new("76561198000000002"))
        );
        assert!(matches!(*rx.try_recv().unwrap(), Notification::State { .. }));
        assert!(matches!(*rx.try_recv().unwrap(), Notification::Ping { .. }));
    }

    #[test]
    fn initial_notifications_order() {
        let kinds: Vec<_> = RouterSnapshot::default()
            .initial_notifications()
            .iter()
            .map(|n| serde_json::to_value(n).unwrap()["kind"].clone())
            .collect();
        assert_eq!(kinds, vec![json!("mapping"), json!("players"), json!("state")]);
    }
}
