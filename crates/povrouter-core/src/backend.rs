// ── Scene backend seam ──
//
// The switcher and topology cache only need four OBS operations.
// `ObsClient` is the production implementation; tests script a fake.

use std::future::Future;

use tokio::sync::watch;

use povrouter_api::{ConnectionState, ObsClient, SceneItemInfo};

use crate::error::CoreError;

/// The subset of the remote scene API the routing engine drives.
pub trait SceneBackend: Send + Sync + 'static {
    /// `true` while requests can be issued.
    fn is_ready(&self) -> bool;

    /// Readiness transitions. Every move into `Connected` invalidates
    /// previously fetched item ids.
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;

    /// Top-level items of a scene.
    fn list_items(&self, scene: &str)
    -> impl Future<Output = Result<Vec<SceneItemInfo>, CoreError>> + Send;

    /// Children of a group, addressed by the group's source name.
    fn list_group_items(
        &self,
        group: &str,
    ) -> impl Future<Output = Result<Vec<SceneItemInfo>, CoreError>> + Send;

    /// Show or hide one item inside its direct parent scope.
    fn set_item_enabled(
        &self,
        scope: &str,
        item_id: i64,
        enabled: bool,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;
}

impl SceneBackend for ObsClient {
    fn is_ready(&self) -> bool {
        ObsClient::is_ready(self)
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        ObsClient::connection_state(self)
    }

    async fn list_items(&self, scene: &str) -> Result<Vec<SceneItemInfo>, CoreError> {
        Ok(self.get_scene_item_list(scene).await?)
    }

    async fn list_group_items(&self, group: &str) -> Result<Vec<SceneItemInfo>, CoreError> {
        Ok(self.get_group_scene_item_list(group).await?)
    }

    async fn set_item_enabled(
        &self,
        scope: &str,
        item_id: i64,
        enabled: bool,
    ) -> Result<(), CoreError> {
        Ok(self.set_scene_item_enabled(scope, item_id, enabled).await?)
    }
}
