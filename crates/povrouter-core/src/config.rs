// ── Runtime routing configuration ──
//
// Describes *what* the router drives inside OBS. Never touches disk;
// the config crate builds one of these and hands it in.

use std::time::Duration;

/// Routing behaviour for one router scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Scene whose items are toggled.
    pub scene: String,
    /// Source activated when the mapped source is missing from the scene.
    pub fallback_source: Option<String>,
    /// Repeat events for the routed player inside this window are dropped.
    pub debounce: Duration,
    /// Case-insensitive name prefix identifying player cameras for hide-all.
    pub camera_prefix: String,
    /// How many levels of groups are expanded when fetching topology.
    pub max_nesting_depth: usize,
    /// Only accept 17-digit SteamID64 player ids.
    pub strict_player_ids: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            scene: "POV_ROUTER".into(),
            fallback_source: None,
            debounce: Duration::from_millis(150),
            camera_prefix: "POV_".into(),
            max_nesting_depth: 1,
            strict_player_ids: true,
        }
    }
}
