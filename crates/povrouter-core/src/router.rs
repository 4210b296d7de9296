// ── Focus router ──
//
// Turns "player X is spectated" into a source activation. Owns the
// mapping, the debounce state and the roster. Only ever driven from
// the routing worker, so none of it is shared.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::backend::SceneBackend;
use crate::config::RouterConfig;
use crate::model::{Mapping, PlayerFocusEvent, PlayerId, SceneItem};
use crate::notify::{Notification, Notifier};
use crate::roster::PlayerRoster;
use crate::switcher::{HideOutcome, SourceSwitcher, SwitchOutcome};
use crate::topology::TopologyCache;

/// Router state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "player", rename_all = "snake_case")]
pub enum RouterPhase {
    /// No player is routed (start-up, unmapped player, or after a forced switch).
    #[default]
    Idle,
    Routed(PlayerId),
}

/// Debounce bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct RoutingState {
    /// Player of the last attempted switch, matched or not.
    pub last_routed_player: Option<PlayerId>,
    pub last_switch_at: Option<Instant>,
}

/// What happened to one focus event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FocusOutcome {
    /// Player id rejected by the id policy.
    Ignored,
    /// No mapping: camera sources were hidden.
    Unmapped { hide: HideOutcome },
    /// Same player inside the debounce window.
    Debounced,
    Routed {
        player: PlayerId,
        switch: SwitchOutcome,
    },
    /// An armed bind captured this player, then routed to the new source.
    Bound {
        player: PlayerId,
        source: String,
        switch: SwitchOutcome,
    },
}

pub struct FocusRouter<B> {
    backend: Arc<B>,
    switcher: SourceSwitcher,
    cache: Arc<TopologyCache>,
    mapping: Mapping,
    roster: PlayerRoster,
    state: RoutingState,
    phase: RouterPhase,
    debounce: Duration,
    strict_player_ids: bool,
    /// Source the next accepted player gets bound to.
    pending_bind: Option<String>,
    notifier: Notifier,
}

impl<B: SceneBackend> FocusRouter<B> {
    pub fn new(
        backend: Arc<B>,
        config: &RouterConfig,
        cache: Arc<TopologyCache>,
        mapping: Mapping,
        notifier: Notifier,
    ) -> Self {
        Self {
            backend,
            switcher: SourceSwitcher::new(config),
            cache,
            mapping,
            roster: PlayerRoster::default(),
            state: RoutingState::default(),
            phase: RouterPhase::Idle,
            debounce: config.debounce,
            strict_player_ids: config.strict_player_ids,
            pending_bind: None,
            notifier,
        }
    }

    pub async fn handle_focus(&mut self, event: PlayerFocusEvent) -> FocusOutcome {
        let player = event.player_id.clone();
        if player.is_empty() || (self.strict_player_ids && !player.is_steam_id()) {
            debug!(player = %player, "ignoring focus event with invalid player id");
            return FocusOutcome::Ignored;
        }

        self.roster.record(&event);
        self.notifier.publish(Notification::Players {
            players: self.roster.snapshot(),
        });

        if let Some(source) = self.pending_bind.take() {
            return self.bind(player, &event.display_name, source).await;
        }

        let Some(source) = self.mapping.get(&player).cloned() else {
            let hide = self
                .switcher
                .hide_all(self.backend.as_ref(), &self.cache)
                .await;
            info!(player = %player, name = %event.display_name, hidden = hide.hidden, "unmapped player, cameras hidden");
            if self.phase != RouterPhase::Idle {
                self.phase = RouterPhase::Idle;
                self.publish_state();
            }
            return FocusOutcome::Unmapped { hide };
        };

        if self.is_debounced(&player) {
            trace!(player = %player, "duplicate focus event suppressed");
            return FocusOutcome::Debounced;
        }

        let switch = self.route(&player, &source).await;
        info!(player = %player, name = %event.display_name, source = %source, success = switch.is_success(), "player routed");

        FocusOutcome::Routed { player, switch }
    }

    /// Map `player` to the armed source and route to it, ignoring debounce.
    async fn bind(&mut self, player: PlayerId, name: &str, source: String) -> FocusOutcome {
        self.mapping.insert(player.clone(), source.clone());
        self.notifier.publish(Notification::Mapping {
            mapping: self.mapping.clone(),
        });

        let switch = self.route(&player, &source).await;
        info!(player = %player, name = %name, source = %source, success = switch.is_success(), "player bound");

        FocusOutcome::Bound {
            player,
            source,
            switch,
        }
    }

    async fn route(&mut self, player: &PlayerId, source: &str) -> SwitchOutcome {
        let switch = self
            .switcher
            .activate(self.backend.as_ref(), &self.cache, source)
            .await;

        self.state.last_routed_player = Some(player.clone());
        self.state.last_switch_at = Some(Instant::now());
        self.phase = RouterPhase::Routed(player.clone());
        self.publish_state();
        switch
    }

    /// Arm (or with `None`, disarm) bind-next mode.
    pub fn arm_bind(&mut self, source: Option<String>) {
        match &source {
            Some(source) => info!(source = %source, "bind armed, waiting for the next player"),
            None => debug!("bind disarmed"),
        }
        self.pending_bind = source;
    }

    pub fn pending_bind(&self) -> Option<&str> {
        self.pending_bind.as_deref()
    }

    /// Activate `source` directly, ignoring mapping and debounce. The next
    /// focus event always routes, even for the previously routed player.
    pub async fn force_switch(&mut self, source: &str) -> SwitchOutcome {
        let outcome = self
            .switcher
            .activate(self.backend.as_ref(), &self.cache, source)
            .await;
        info!(source = %source, success = outcome.is_success(), "forced switch");

        self.state.last_routed_player = None;
        self.phase = RouterPhase::Idle;
        self.publish_state();
        outcome
    }

    /// Replace the mapping. Takes effect with the next focus event.
    pub fn mapping_changed(&mut self, mapping: Mapping) {
        debug!(entries = mapping.len(), "mapping replaced");
        self.mapping = mapping;
        self.notifier.publish(Notification::Mapping {
            mapping: self.mapping.clone(),
        });
    }

    pub async fn invalidate_topology(&self) {
        self.cache.invalidate().await;
    }

    /// Router scene items, fetched on a cache miss. While OBS is away
    /// whatever is still cached is returned.
    pub async fn topology(&self) -> Arc<Vec<SceneItem>> {
        let scene = self.switcher.scene();
        if !self.backend.is_ready() {
            return self.cache.snapshot(scene).await.unwrap_or_default();
        }
        self.cache.get(self.backend.as_ref(), scene).await.items
    }

    pub fn phase(&self) -> &RouterPhase {
        &self.phase
    }

    pub fn routing_state(&self) -> &RoutingState {
        &self.state
    }

    fn is_debounced(&self, player: &PlayerId) -> bool {
        self.state.last_routed_player.as_ref() == Some(player)
            && self
                .state
                .last_switch_at
                .is_some_and(|at| at.elapsed() < self.debounce)
    }

    fn publish_state(&self) {
        self.notifier.publish(Notification::State {
            last_routed_player: self.state.last_routed_player.clone(),
            phase: self.phase.clone(),
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::fake::FakeObs;
    use crate::notify::RouterSnapshot;

    const ALICE: &str = "76561198000000001";
    const BOB: &str = "76561198000000002";
    const STRANGER: &str = "76561198000000009";

    fn build_router(obs: &Arc<FakeObs>, config: RouterConfig) -> FocusRouter<FakeObs> {
        let mut mapping = Mapping::new();
        mapping.insert(ALICE.into(), "POV_Alice".into());
        mapping.insert(BOB.into(), "POV_Bob".into());
        FocusRouter::new(
            Arc::clone(obs),
            &config,
            Arc::new(TopologyCache::new(config.max_nesting_depth)),
            mapping,
            Notifier::new(64, RouterSnapshot::default()),
        )
    }

    fn focus(id: &str) -> PlayerFocusEvent {
        PlayerFocusEvent::new(id.into(), "player")
    }

    #[tokio::test]
    async fn routes_mapped_player() {
        let obs = Arc::new(FakeObs::scenario());
        let mut router = build_router(&obs, RouterConfig::default());

        let outcome = router.handle_focus(focus(ALICE)).await;

        assert_eq!(
            outcome,
            FocusOutcome::Routed {
                player: ALICE.into(),
                switch: SwitchOutcome::Activated {
                    source: "POV_Alice".into()
                },
            }
        );
        assert_eq!(router.phase(), &RouterPhase::Routed(ALICE.into()));
        assert_eq!(obs.visible_sources(), vec!["POV_Alice".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn debounces_same_player_inside_window() {
        let obs = Arc::new(FakeObs::scenario());
        let mut router = build_router(&obs, RouterConfig::default());

        router.handle_focus(focus(ALICE)).await;
        let toggles = obs.toggles().len();

        assert_eq!(router.handle_focus(focus(ALICE)).await, FocusOutcome::Debounced);
        assert_eq!(obs.toggles().len(), toggles);

        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(matches!(
            router.handle_focus(focus(ALICE)).await,
            FocusOutcome::Routed { .. }
        ));
        assert!(obs.toggles().len() > toggles);
    }

    #[tokio::test(start_paused = true)]
    async fn different_player_is_never_debounced() {
        let obs = Arc::new(FakeObs::scenario());
        let mut router = build_router(&obs, RouterConfig::default());

        router.handle_focus(focus(ALICE)).await;
        let outcome = router.handle_focus(focus(BOB)).await;

        assert!(matches!(outcome, FocusOutcome::Routed { .. }));
        assert_eq!(obs.visible_sources(), vec!["POV_Bob".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn unmapped_player_hides_cameras_and_keeps_debounce_state() {
        let obs = Arc::new(FakeObs::scenario());
        let mut router = build_router(&obs, RouterConfig::default());

        router.handle_focus(focus(ALICE)).await;
        let before = router.routing_state().clone();

        let outcome = router.handle_focus(focus(STRANGER)).await;

        assert!(matches!(outcome, FocusOutcome::Unmapped { hide } if hide.hidden == 3));
        assert_eq!(router.phase(), &RouterPhase::Idle);
        assert_eq!(router.routing_state().last_routed_player, before.last_routed_player);
        assert_eq!(router.routing_state().last_switch_at, before.last_switch_at);
        assert_eq!(obs.visible_sources(), vec!["Scoreboard".to_owned()]);

        // Still inside Alice's window: her camera stays hidden until it expires
        assert_eq!(router.handle_focus(focus(ALICE)).await, FocusOutcome::Debounced);
    }

    #[tokio::test(start_paused = true)]
    async fn force_switch_resets_debounce() {
        let obs = Arc::new(FakeObs::scenario());
        let mut router = build_router(&obs, RouterConfig::default());

        router.handle_focus(focus(ALICE)).await;
        let outcome = router.force_switch("POV_Bob").await;
        assert!(outcome.is_success());
        assert_eq!(router.routing_state().last_routed_player, None);
        assert_eq!(obs.visible_sources(), vec!["POV_Bob".to_owned()]);

        // Immediately after, Alice routes again instead of being suppressed
        let outcome = router.handle_focus(focus(ALICE)).await;
        assert!(matches!(outcome, FocusOutcome::Routed { .. }));
        assert_eq!(obs.visible_sources(), vec!["POV_Alice".to_owned()]);
    }

    #[tokio::test]
    async fn mapping_change_applies_to_next_event() {
        let obs = Arc::new(FakeObs::scenario());
        let mut router = build_router(&obs, RouterConfig::default());
        let mut rx = router.notifier.subscribe();

        let mut mapping = Mapping::new();
        mapping.insert(STRANGER.into(), "POV_Carol".into());
        router.mapping_changed(mapping);

        assert!(obs.toggles().is_empty());
        assert!(matches!(*rx.try_recv().unwrap(), Notification::Mapping { .. }));

        router.handle_focus(focus(STRANGER)).await;
        assert_eq!(obs.visible_sources(), vec!["POV_Carol".to_owned()]);
    }

    #[tokio::test]
    async fn strict_ids_reject_malformed_players() {
        let obs = Arc::new(FakeObs::scenario());
        let mut router = build_router(&obs, RouterConfig::default());

        assert_eq!(router.handle_focus(focus("bot")).await, FocusOutcome::Ignored);
        assert_eq!(router.handle_focus(focus("")).await, FocusOutcome::Ignored);
        assert!(obs.toggles().is_empty());
        assert!(router.notifier.current().players.is_empty());

        let mut relaxed = build_router(
            &obs,
            RouterConfig {
                strict_player_ids: false,
                ..RouterConfig::default()
            },
        );
        assert!(matches!(
            relaxed.handle_focus(focus("bot")).await,
            FocusOutcome::Unmapped { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn armed_bind_captures_next_player() {
        let obs = Arc::new(FakeObs::scenario());
        let mut router = build_router(&obs, RouterConfig::default());
        router.handle_focus(focus(ALICE)).await;
        let mut rx = router.notifier.subscribe();

        router.arm_bind(Some("POV_Carol".into()));
        assert_eq!(router.pending_bind(), Some("POV_Carol"));

        // Ignored ids do not consume the bind
        assert_eq!(router.handle_focus(focus("bot")).await, FocusOutcome::Ignored);
        assert_eq!(router.pending_bind(), Some("POV_Carol"));

        // Alice is still inside her debounce window, the bind wins anyway
        let outcome = router.handle_focus(focus(ALICE)).await;
        assert_eq!(
            outcome,
            FocusOutcome::Bound {
                player: ALICE.into(),
                source: "POV_Carol".into(),
                switch: SwitchOutcome::Activated {
                    source: "POV_Carol".into()
                },
            }
        );
        assert_eq!(router.pending_bind(), None);
        assert_eq!(obs.visible_sources(), vec!["POV_Carol".to_owned()]);

        let _players = rx.try_recv().unwrap();
        match &*rx.try_recv().unwrap() {
            Notification::Mapping { mapping } => {
                assert_eq!(mapping.get(&PlayerId::new(ALICE)).unwrap(), "POV_Carol");
            }
            other => panic!("unexpected notification: {other:?}"),
        }

        // One-shot: the next player routes through the mapping as usual
        let outcome = router.handle_focus(focus(BOB)).await;
        assert!(matches!(outcome, FocusOutcome::Routed { .. }));
        assert_eq!(obs.visible_sources(), vec!["POV_Bob".to_owned()]);
    }

    #[tokio::test]
    async fn disarmed_bind_routes_normally() {
        let obs = Arc::new(FakeObs::scenario());
        let mut router = build_router(&obs, RouterConfig::default());

        router.arm_bind(Some("POV_Carol".into()));
        router.arm_bind(None);

        let outcome = router.handle_focus(focus(ALICE)).await;
        assert!(matches!(outcome, FocusOutcome::Routed { .. }));
        assert_eq!(obs.visible_sources(), vec!["POV_Alice".to_owned()]);
    }

    #[tokio::test]
    async fn emits_players_then_state() {
        let obs = Arc::new(FakeObs::scenario());
        let mut router = build_router(&obs, RouterConfig::default());
        let mut rx = router.notifier.subscribe();

        router.handle_focus(focus(ALICE)).await;

        match &*rx.try_recv().unwrap() {
            Notification::Players { players } => {
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].steam_id, PlayerId::new(ALICE));
            }
            other => panic!("unexpected notification: {other:?}"),
        }
        match &*rx.try_recv().unwrap() {
            Notification::State {
                last_routed_player, ..
            } => assert_eq!(last_routed_player.as_ref(), Some(&PlayerId::new(ALICE))),
            other => panic!("unexpected notification: {other:?}"),
        }
    }
}
