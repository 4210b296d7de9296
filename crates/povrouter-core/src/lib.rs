// povrouter-core: Routing engine between the obs-websocket session and the HTTP surface.

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod notify;
pub mod roster;
pub mod router;
pub mod stream;
pub mod switcher;
pub mod topology;

#[cfg(test)]
pub(crate) mod fake;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backend::SceneBackend;
pub use config::RouterConfig;
pub use engine::RouterHandle;
pub use error::CoreError;
pub use model::{Mapping, PlayerFocusEvent, PlayerId, SceneItem};
pub use notify::{Notification, RouterSnapshot};
pub use roster::PlayerSighting;
pub use router::{FocusOutcome, RouterPhase};
pub use stream::NotificationStream;
pub use switcher::{HideOutcome, SwitchOutcome};

pub use povrouter_api::ConnectionState;
