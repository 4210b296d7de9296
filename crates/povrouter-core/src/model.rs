// ── Routing domain types ──

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use povrouter_api::SceneItemInfo;

/// Length of a SteamID64 in decimal digits.
const STEAM_ID_DIGITS: usize = 17;

// ── PlayerId ────────────────────────────────────────────────────────

/// Opaque player key, normally a SteamID64 such as `76561198000000001`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` for exactly 17 ASCII digits.
    pub fn is_steam_id(&self) -> bool {
        self.0.len() == STEAM_ID_DIGITS && self.0.bytes().all(|b| b.is_ascii_digit())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Player → source name. Keys are unique; sorted for stable output.
pub type Mapping = BTreeMap<PlayerId, String>;

// ── PlayerFocusEvent ────────────────────────────────────────────────

/// "This player is now being spectated."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerFocusEvent {
    pub player_id: PlayerId,
    pub display_name: String,
    pub observed_at: DateTime<Utc>,
}

impl PlayerFocusEvent {
    pub fn new(player_id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            player_id,
            display_name: display_name.into(),
            observed_at: Utc::now(),
        }
    }
}

// ── SceneItem ───────────────────────────────────────────────────────

/// One entry of a flattened scene tree.
///
/// `item_id` is only meaningful for the OBS session it was fetched in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneItem {
    /// Scene or group the item lives directly under.
    pub container_scene: String,
    pub item_id: i64,
    pub source_name: String,
    /// Item is a group that holds further items.
    pub is_container: bool,
}

impl SceneItem {
    pub fn from_remote(container_scene: &str, info: SceneItemInfo) -> Self {
        let is_container = info.is_group();
        Self {
            container_scene: container_scene.to_owned(),
            item_id: info.scene_item_id,
            source_name: info.source_name,
            is_container,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steam_id_validation() {
        assert!(PlayerId::new("76561198000000001").is_steam_id());
        assert!(PlayerId::new(" 76561198000000001\n").is_steam_id());
        assert!(!PlayerId::new("7656119800000000").is_steam_id());
        assert!(!PlayerId::new("7656119800000000a").is_steam_id());
        assert!(!PlayerId::new("765611980000000011").is_steam_id());
        assert!(!PlayerId::new("").is_steam_id());
    }

    #[test]
    fn mapping_serializes_as_flat_object() {
        let mut mapping = Mapping::new();
        mapping.insert("76561198000000002".into(), "POV_Bob".into());
        mapping.insert("76561198000000001".into(), "POV_Alice".into());

        let json = serde_json::to_string(&mapping).unwrap();
        assert_eq!(
            json,
            r#"{"76561198000000001":"POV_Alice","76561198000000002":"POV_Bob"}"#
        );
    }

    #[test]
    fn scene_item_from_remote_tags_container() {
        let info = SceneItemInfo {
            scene_item_id: 4,
            source_name: "POV_Carol".into(),
            is_group: None,
            scene_item_enabled: false,
            scene_item_index: 0,
        };
        let item = SceneItem::from_remote("Team", info);
        assert_eq!(item.container_scene, "Team");
        assert_eq!(item.item_id, 4);
        assert!(!item.is_container);
    }
}
