// ── Player roster ──
//
// Every player the webhook has reported, for the dashboard's
// "bind a player" list.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{PlayerFocusEvent, PlayerId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerSighting {
    #[serde(rename = "steamid")]
    pub steam_id: PlayerId,
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct PlayerRoster {
    players: HashMap<PlayerId, PlayerSighting>,
}

impl PlayerRoster {
    /// Insert or refresh the sighting for the event's player.
    pub fn record(&mut self, event: &PlayerFocusEvent) {
        self.players.insert(
            event.player_id.clone(),
            PlayerSighting {
                steam_id: event.player_id.clone(),
                name: event.display_name.clone(),
                last_seen: event.observed_at,
            },
        );
    }

    /// All sightings, most recent first.
    pub fn snapshot(&self) -> Vec<PlayerSighting> {
        let mut players: Vec<_> = self.players.values().cloned().collect();
        players.sort_by(|a, b| {
            b.last_seen
                .cmp(&a.last_seen)
                .then_with(|| a.steam_id.cmp(&b.steam_id))
        });
        players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn seen(id: &str, name: &str, secs: i64) -> PlayerFocusEvent {
        PlayerFocusEvent {
            player_id: id.into(),
            display_name: name.into(),
            observed_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn newest_first_and_deduplicated() {
        let mut roster = PlayerRoster::default();
        roster.record(&seen("76561198000000001", "alice", 10));
        roster.record(&seen("76561198000000002", "bob", 20));
        roster.record(&seen("76561198000000001", "alice2", 30));

        let players = roster.snapshot();
        assert_eq!(roster.len(), 2);
        assert_eq!(players[0].name, "alice2");
        assert_eq!(players[1].name, "bob");
    }

    #[test]
    fn sighting_wire_format() {
        let sighting = PlayerSighting {
            steam_id: "76561198000000001".into(),
            name: "alice".into(),
            last_seen: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        };
        let json = serde_json::to_value(&sighting).unwrap();
        assert_eq!(json["steamid"], "76561198000000001");
        assert_eq!(json["last_seen"], 1_700_000_000_000_i64);
    }
}
