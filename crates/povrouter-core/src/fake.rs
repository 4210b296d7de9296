// In-memory scene backend for switcher, router and engine tests.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::watch;

use povrouter_api::{ConnectionState, SceneItemInfo};

use crate::backend::SceneBackend;
use crate::error::CoreError;

#[derive(Default)]
struct FakeState {
    /// Scene or group name → items listed under it.
    listings: HashMap<String, Vec<SceneItemInfo>>,
    /// (scope, item id) → visibility.
    enabled: HashMap<(String, i64), bool>,
    /// Every successful toggle, in call order.
    toggles: Vec<(String, i64, bool)>,
    failing_ids: HashSet<i64>,
}

pub(crate) struct FakeObs {
    state_tx: watch::Sender<ConnectionState>,
    state: Mutex<FakeState>,
    list_calls: AtomicUsize,
    panic_next_list: AtomicBool,
}

impl FakeObs {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connected);
        Self {
            state_tx,
            state: Mutex::new(FakeState::default()),
            list_calls: AtomicUsize::new(0),
            panic_next_list: AtomicBool::new(false),
        }
    }

    /// `POV_ROUTER`: POV_Alice(1), POV_Bob(2), Team(3, group), Scoreboard(5);
    /// `Team`: POV_Carol(4). Everything starts visible.
    pub fn scenario() -> Self {
        let obs = Self::new();
        obs.set_listing(
            "POV_ROUTER",
            &[
                (1, "POV_Alice", false),
                (2, "POV_Bob", false),
                (3, "Team", true),
                (5, "Scoreboard", false),
            ],
        );
        obs.set_listing("Team", &[(4, "POV_Carol", false)]);
        obs
    }

    pub fn set_listing(&self, scope: &str, items: &[(i64, &str, bool)]) {
        let mut state = self.state.lock().unwrap();
        let infos = items
            .iter()
            .enumerate()
            .map(|(index, (id, name, group))| SceneItemInfo {
                scene_item_id: *id,
                source_name: (*name).to_owned(),
                is_group: group.then_some(true),
                scene_item_enabled: true,
                scene_item_index: i64::try_from(index).unwrap(),
            })
            .collect();
        for (id, _, _) in items {
            state.enabled.insert((scope.to_owned(), *id), true);
        }
        state.listings.insert(scope.to_owned(), infos);
    }

    pub fn set_ready(&self, ready: bool) {
        let next = if ready {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        self.state_tx.send_replace(next);
    }

    /// Drop and re-establish the session.
    pub fn simulate_reconnect(&self) {
        self.set_ready(false);
        self.set_ready(true);
    }

    pub fn fail_toggles_for(&self, item_id: i64) {
        self.state.lock().unwrap().failing_ids.insert(item_id);
    }

    pub fn panic_on_next_list(&self) {
        self.panic_next_list.store(true, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self, scope: &str, item_id: i64) -> bool {
        let state = self.state.lock().unwrap();
        state
            .enabled
            .get(&(scope.to_owned(), item_id))
            .copied()
            .unwrap_or(false)
    }

    pub fn set_enabled(&self, scope: &str, item_id: i64, enabled: bool) {
        let mut state = self.state.lock().unwrap();
        state.enabled.insert((scope.to_owned(), item_id), enabled);
    }

    pub fn toggles(&self) -> Vec<(String, i64, bool)> {
        self.state.lock().unwrap().toggles.clone()
    }

    pub fn clear_toggles(&self) {
        self.state.lock().unwrap().toggles.clear();
    }

    /// Names of every visible non-group item across all scopes.
    pub fn visible_sources(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let enabled = &state.enabled;
        let mut names: Vec<String> = state
            .listings
            .iter()
            .flat_map(|(scope, items)| {
                items
                    .iter()
                    .filter(|i| !i.is_group())
                    .filter(move |i| {
                        enabled
                            .get(&(scope.clone(), i.scene_item_id))
                            .copied()
                            .unwrap_or(false)
                    })
                    .map(|i| i.source_name.clone())
            })
            .collect();
        names.sort();
        names
    }

    fn listing(&self, scope: &str) -> Result<Vec<SceneItemInfo>, CoreError> {
        if !SceneBackend::is_ready(self) {
            return Err(CoreError::SessionNotReady);
        }
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        assert!(
            !self.panic_next_list.swap(false, Ordering::SeqCst),
            "scripted listing panic"
        );
        let state = self.state.lock().unwrap();
        state
            .listings
            .get(scope)
            .cloned()
            .ok_or_else(|| CoreError::Remote {
                message: format!("No source was found by the name of `{scope}`"),
                code: Some(600),
            })
    }
}

impl SceneBackend for FakeObs {
    fn is_ready(&self) -> bool {
        *self.state_tx.borrow() == ConnectionState::Connected
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    async fn list_items(&self, scene: &str) -> Result<Vec<SceneItemInfo>, CoreError> {
        self.listing(scene)
    }

    async fn list_group_items(&self, group: &str) -> Result<Vec<SceneItemInfo>, CoreError> {
        self.listing(group)
    }

    async fn set_item_enabled(
        &self,
        scope: &str,
        item_id: i64,
        enabled: bool,
    ) -> Result<(), CoreError> {
        if !SceneBackend::is_ready(self) {
            return Err(CoreError::SessionNotReady);
        }
        let mut state = self.state.lock().unwrap();
        if state.failing_ids.contains(&item_id) {
            return Err(CoreError::Remote {
                message: format!("SetSceneItemEnabled: item {item_id} rejected"),
                code: Some(600),
            });
        }
        state.enabled.insert((scope.to_owned(), item_id), enabled);
        state.toggles.push((scope.to_owned(), item_id, enabled));
        Ok(())
    }
}
