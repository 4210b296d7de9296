// ── Control API ──
//
// Mapping edits, forced switches and read-only views for the dashboard.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use tracing::info;

use povrouter_core::{Mapping, PlayerId, PlayerSighting, RouterPhase, SceneItem, SwitchOutcome};

use super::{ApiError, SharedState};

// ── Force switch ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ForceRequest {
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct ForceResponse {
    pub forced: String,
    pub success: bool,
    pub outcome: SwitchOutcome,
}

async fn force(state: &SharedState, source: &str) -> Result<Json<ForceResponse>, ApiError> {
    let source = source.trim();
    if source.is_empty() {
        return Err(ApiError::BadRequest("source must not be empty".into()));
    }

    let outcome = state.router.force_switch(source).await?;
    Ok(Json(ForceResponse {
        forced: source.to_owned(),
        success: outcome.is_success(),
        outcome,
    }))
}

pub async fn force_path(
    State(state): State<SharedState>,
    Path(source): Path<String>,
) -> Result<Json<ForceResponse>, ApiError> {
    force(&state, &source).await
}

pub async fn force_body(
    State(state): State<SharedState>,
    Json(request): Json<ForceRequest>,
) -> Result<Json<ForceResponse>, ApiError> {
    force(&state, &request.source).await
}

// ── Mapping ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MappingEntry {
    pub steamid: String,
    pub source: String,
}

pub async fn get_mapping(State(state): State<SharedState>) -> Json<Mapping> {
    Json(state.router.snapshot().mapping)
}

pub async fn set_mapping(
    State(state): State<SharedState>,
    Json(entry): Json<MappingEntry>,
) -> Result<Json<Mapping>, ApiError> {
    let player = PlayerId::new(&entry.steamid);
    let source = entry.source.trim().to_owned();
    if player.is_empty() || source.is_empty() {
        return Err(ApiError::BadRequest(
            "steamid and source must not be empty".into(),
        ));
    }

    info!(player = %player, source = %source, "mapping entry set");
    let mapping = state
        .update_mapping(|m| {
            m.insert(player, source);
        })
        .await?;
    Ok(Json(mapping))
}

pub async fn delete_mapping(
    State(state): State<SharedState>,
    Path(steamid): Path<String>,
) -> Result<Json<Mapping>, ApiError> {
    let player = PlayerId::new(&steamid);
    info!(player = %player, "mapping entry removed");
    let mapping = state
        .update_mapping(|m| {
            m.remove(&player);
        })
        .await?;
    Ok(Json(mapping))
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub entries: usize,
    pub mapping: Mapping,
}

pub async fn reload_mapping(
    State(state): State<SharedState>,
) -> Result<Json<ReloadResponse>, ApiError> {
    let mapping = state.reload_mapping().await?;
    info!(
        path = %state.mapping_file.path().display(),
        entries = mapping.len(),
        "mapping reloaded"
    );
    Ok(Json(ReloadResponse {
        entries: mapping.len(),
        mapping,
    }))
}

// ── Bind-next ────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct BindRequest {
    /// Missing or blank disarms.
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BindResponse {
    pub armed: Option<String>,
}

/// Bind the next spectated player to `source`. The binding is persisted
/// by the GSI handler once a player is captured.
pub async fn bind(
    State(state): State<SharedState>,
    Json(request): Json<BindRequest>,
) -> Result<Json<BindResponse>, ApiError> {
    let source = request
        .source
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty());

    state.router.arm_bind(source.clone()).await?;
    Ok(Json(BindResponse { armed: source }))
}

// ── Views ────────────────────────────────────────────────────────────

pub async fn players(State(state): State<SharedState>) -> Json<Vec<PlayerSighting>> {
    Json(state.router.snapshot().players)
}

/// Items of the router scene; empty while OBS is away and nothing is cached.
pub async fn sources(
    State(state): State<SharedState>,
) -> Result<Json<Arc<Vec<SceneItem>>>, ApiError> {
    Ok(Json(state.router.topology().await?))
}

#[derive(Debug, Serialize)]
pub struct RoutingView {
    pub phase: RouterPhase,
    pub last_routed_player: Option<PlayerId>,
}

pub async fn routing_state(State(state): State<SharedState>) -> Json<RoutingView> {
    let snapshot = state.router.snapshot();
    Json(RoutingView {
        phase: snapshot.phase,
        last_routed_player: snapshot.last_routed_player,
    })
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub ok: bool,
    pub obs_connected: bool,
    pub obs_state: String,
    pub scene: String,
    pub last_routed_player: Option<PlayerId>,
}

pub async fn health(State(state): State<SharedState>) -> Json<Health> {
    Json(Health {
        ok: true,
        obs_connected: state.obs.is_ready(),
        obs_state: state.obs.state().to_string(),
        scene: state.router.scene().to_owned(),
        last_routed_player: state.router.snapshot().last_routed_player,
    })
}
