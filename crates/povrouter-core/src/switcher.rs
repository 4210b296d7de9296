// ── Source switcher ──
//
// Makes exactly one camera source visible in the router scene. Works
// off the topology cache: enables every group the target sits in,
// then sets each non-group item visible iff it is the target.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::SceneBackend;
use crate::config::RouterConfig;
use crate::error::CoreError;
use crate::model::SceneItem;
use crate::topology::{Topology, TopologyCache};

/// What an activation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SwitchOutcome {
    /// Target found and every toggle succeeded.
    Activated { source: String },
    /// Target found, but `failed` toggles were rejected.
    Partial { source: String, failed: usize },
    /// Target missing; the configured fallback was activated instead.
    FellBack {
        requested: String,
        outcome: Box<SwitchOutcome>,
    },
    /// Target missing and no usable fallback. Nothing was toggled.
    NotFound { source: String },
    /// OBS was not ready. Nothing was toggled.
    Skipped,
}

impl SwitchOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            Self::Activated { .. } => true,
            Self::FellBack { outcome, .. } => outcome.is_success(),
            Self::Partial { .. } | Self::NotFound { .. } | Self::Skipped => false,
        }
    }

    /// The source that ended up visible, if any.
    pub fn active_source(&self) -> Option<&str> {
        match self {
            Self::Activated { source } | Self::Partial { source, .. } => Some(source.as_str()),
            Self::FellBack { outcome, .. } => outcome.active_source(),
            Self::NotFound { .. } | Self::Skipped => None,
        }
    }
}

/// Result of hiding every camera source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HideOutcome {
    pub hidden: usize,
    pub failed: usize,
    /// OBS was not ready, nothing was attempted.
    pub skipped: bool,
}

/// Drives item visibility in one scene.
#[derive(Debug, Clone)]
pub struct SourceSwitcher {
    scene: String,
    fallback: Option<String>,
    camera_prefix: String,
}

impl SourceSwitcher {
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            scene: config.scene.clone(),
            fallback: config.fallback_source.clone(),
            camera_prefix: config.camera_prefix.clone(),
        }
    }

    pub fn scene(&self) -> &str {
        &self.scene
    }

    /// Make `target` the only visible source, falling back once to the
    /// configured fallback source when `target` is not in the scene.
    pub async fn activate<B: SceneBackend>(
        &self,
        backend: &B,
        cache: &TopologyCache,
        target: &str,
    ) -> SwitchOutcome {
        let outcome = self.activate_exact(backend, cache, target).await;
        let SwitchOutcome::NotFound { source } = outcome else {
            return outcome;
        };

        match self.fallback.as_deref() {
            Some(fallback) if fallback != target => {
                warn!(
                    requested = %target,
                    fallback = %fallback,
                    scene = %self.scene,
                    "source not found, activating fallback"
                );
                let outcome = self.activate_exact(backend, cache, fallback).await;
                SwitchOutcome::FellBack {
                    requested: source,
                    outcome: Box::new(outcome),
                }
            }
            _ => {
                let err = CoreError::TargetNotFound {
                    source_name: source.clone(),
                    scene: self.scene.clone(),
                };
                warn!(error = %err, "no fallback source, leaving scene as is");
                SwitchOutcome::NotFound { source }
            }
        }
    }

    /// Activate `target` without fallback.
    async fn activate_exact<B: SceneBackend>(
        &self,
        backend: &B,
        cache: &TopologyCache,
        target: &str,
    ) -> SwitchOutcome {
        if !backend.is_ready() {
            debug!(source = %target, "OBS not ready, switch skipped");
            return SwitchOutcome::Skipped;
        }

        let mut topology = cache.get(backend, &self.scene).await;
        if topology.find(target).is_none() && !topology.fresh {
            debug!(source = %target, "source not in cached topology, refetching");
            cache.invalidate().await;
            topology = cache.get(backend, &self.scene).await;
        }

        let Some(target_item) = topology.find(target) else {
            // An empty topology from a dropped session is not a missing source
            if !backend.is_ready() {
                debug!(source = %target, "OBS went away during lookup, switch skipped");
                return SwitchOutcome::Skipped;
            }
            return SwitchOutcome::NotFound {
                source: target.to_owned(),
            };
        };

        let mut failed = self.apply(backend, &topology, target_item).await;

        // Item ids change when a source is re-added in OBS
        if failed > 0 && !topology.fresh && backend.is_ready() {
            debug!(source = %target, failed, "toggles failed on cached topology, refetching");
            cache.invalidate().await;
            topology = cache.get(backend, &self.scene).await;
            if let Some(target_item) = topology.find(target) {
                failed = self.apply(backend, &topology, target_item).await;
            }
        }

        if failed == 0 {
            info!(source = %target, scene = %self.scene, "source activated");
            SwitchOutcome::Activated {
                source: target.to_owned(),
            }
        } else {
            warn!(source = %target, failed, "source activated with failed toggles");
            SwitchOutcome::Partial {
                source: target.to_owned(),
                failed,
            }
        }
    }

    /// Issue the toggles for `target`. Returns how many failed.
    async fn apply<B: SceneBackend>(
        &self,
        backend: &B,
        topology: &Topology,
        target: &SceneItem,
    ) -> usize {
        let mut failed = 0;

        for group in ancestors(&topology.items, target, &self.scene) {
            if !toggle(backend, group, true).await {
                failed += 1;
            }
        }

        for item in topology.items.iter().filter(|i| !i.is_container) {
            let enabled = item.source_name == target.source_name;
            if !toggle(backend, item, enabled).await {
                failed += 1;
            }
        }

        failed
    }

    /// Hide every camera source, leaving everything else alone.
    pub async fn hide_all<B: SceneBackend>(
        &self,
        backend: &B,
        cache: &TopologyCache,
    ) -> HideOutcome {
        if !backend.is_ready() {
            debug!("OBS not ready, hide-all skipped");
            return HideOutcome {
                skipped: true,
                ..HideOutcome::default()
            };
        }

        let topology = cache.get(backend, &self.scene).await;
        let mut outcome = HideOutcome::default();

        for item in topology
            .items
            .iter()
            .filter(|i| !i.is_container && self.is_camera(&i.source_name))
        {
            if toggle(backend, item, false).await {
                outcome.hidden += 1;
            } else {
                outcome.failed += 1;
            }
        }

        debug!(hidden = outcome.hidden, failed = outcome.failed, "camera sources hidden");
        outcome
    }

    /// Name starts with the camera prefix, ignoring ASCII case.
    pub fn is_camera(&self, source_name: &str) -> bool {
        source_name
            .get(..self.camera_prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(&self.camera_prefix))
    }
}

/// Groups containing `target`, innermost first.
fn ancestors<'a>(items: &'a [SceneItem], target: &'a SceneItem, root: &str) -> Vec<&'a SceneItem> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut scope = target.container_scene.as_str();

    while scope != root && seen.insert(scope) {
        let Some(group) = items
            .iter()
            .find(|i| i.is_container && i.source_name == scope)
        else {
            break;
        };
        chain.push(group);
        scope = group.container_scene.as_str();
    }

    chain
}

/// Set one item's visibility. Failures are logged, never propagated.
async fn toggle<B: SceneBackend>(backend: &B, item: &SceneItem, enabled: bool) -> bool {
    match backend
        .set_item_enabled(&item.container_scene, item.item_id, enabled)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            let err = CoreError::ToggleFailed {
                source_name: item.source_name.clone(),
                reason: e.to_string(),
            };
            warn!(error = %err, scope = %item.container_scene, enabled, "toggle failed");
            false
        }
    }
}
