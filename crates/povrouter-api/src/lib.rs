// povrouter-api: Async Rust client for the OBS Studio obs-websocket (v5) protocol

pub mod auth;
pub mod error;
pub mod protocol;
pub mod session;

pub use error::Error;
pub use protocol::{ObsVersion, SceneItemInfo};
pub use session::{ConnectionState, ObsClient, SessionConfig};
