// ── Scene topology cache ──
//
// Flattened, depth-first view of the router scene's item tree. Groups
// are followed immediately by their children, each child tagged with
// the group it lives in. Fetched lazily, dropped on reconnect.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::backend::SceneBackend;
use crate::error::CoreError;
use crate::model::SceneItem;

/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub struct Topology {
    pub items: Arc<Vec<SceneItem>>,
    /// The items were fetched from OBS during this lookup.
    pub fresh: bool,
}

impl Topology {
    pub fn find(&self, source_name: &str) -> Option<&SceneItem> {
        self.items.iter().find(|i| i.source_name == source_name)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Per-scene topology cache.
///
/// Fetch and invalidation run under one lock, so a lookup never
/// returns items from before an invalidation that raced with it.
#[derive(Debug)]
pub struct TopologyCache {
    max_depth: usize,
    scenes: Mutex<HashMap<String, Arc<Vec<SceneItem>>>>,
}

impl TopologyCache {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            scenes: Mutex::new(HashMap::new()),
        }
    }

    /// Cached topology of `scene`, fetching it on a miss.
    ///
    /// A failed fetch yields an empty topology and leaves the cache
    /// empty so the next lookup tries again.
    pub async fn get<B: SceneBackend>(&self, backend: &B, scene: &str) -> Topology {
        let mut scenes = self.scenes.lock().await;
        if let Some(items) = scenes.get(scene) {
            return Topology {
                items: Arc::clone(items),
                fresh: false,
            };
        }

        match fetch_topology(backend, scene, self.max_depth).await {
            Ok(items) => {
                debug!(scene, items = items.len(), "topology fetched");
                let items = Arc::new(items);
                scenes.insert(scene.to_owned(), Arc::clone(&items));
                Topology { items, fresh: true }
            }
            Err(e) => {
                let err = CoreError::TopologyFetchFailed {
                    scene: scene.to_owned(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "using empty topology");
                Topology {
                    items: Arc::new(Vec::new()),
                    fresh: true,
                }
            }
        }
    }

    /// Drop every cached scene.
    pub async fn invalidate(&self) {
        let mut scenes = self.scenes.lock().await;
        if !scenes.is_empty() {
            debug!(scenes = scenes.len(), "topology cache invalidated");
        }
        scenes.clear();
    }

    /// Cached items of `scene` without fetching.
    pub async fn snapshot(&self, scene: &str) -> Option<Arc<Vec<SceneItem>>> {
        self.scenes.lock().await.get(scene).cloned()
    }
}

/// Walk `scene` depth-first, expanding groups up to `max_depth` levels.
///
/// Any failing listing fails the whole fetch.
pub async fn fetch_topology<B: SceneBackend>(
    backend: &B,
    scene: &str,
    max_depth: usize,
) -> Result<Vec<SceneItem>, CoreError> {
    let top = backend.list_items(scene).await?;

    let mut items = Vec::new();
    let mut stack = vec![(scene.to_owned(), top.into_iter(), 0_usize)];

    while let Some((scope, remaining, depth)) = stack.last_mut() {
        let Some(info) = remaining.next() else {
            stack.pop();
            continue;
        };

        let item = SceneItem::from_remote(scope.as_str(), info);
        let expand = item.is_container && *depth < max_depth;
        let child_depth = *depth + 1;
        let group = expand.then(|| item.source_name.clone());
        items.push(item);

        if let Some(group) = group {
            let children = backend.list_group_items(&group).await?;
            stack.push((group, children.into_iter(), child_depth));
        }
    }

    Ok(items)
}
