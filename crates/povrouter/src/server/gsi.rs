// ── GSI webhook ──
//
// CS2 posts its game state here on every change. Only the spectated
// player matters: the id and name become one focus event.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use povrouter_core::{FocusOutcome, PlayerId, SwitchOutcome};

use super::{ApiError, SharedState};

const TOKEN_HEADER: &str = "x-gsi-token";
const UNKNOWN_PLAYER: &str = "unknown";

#[derive(Debug, Default, Deserialize)]
pub struct GsiPayload {
    #[serde(default)]
    pub player: Option<GsiPlayer>,
    #[serde(default)]
    pub provider: Option<GsiPlayer>,
    #[serde(default)]
    pub allplayers: Option<GsiPlayer>,
    #[serde(default)]
    pub auth: Option<GsiAuth>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GsiPlayer {
    /// String in practice; numbers are tolerated.
    #[serde(default)]
    pub steamid: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GsiAuth {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

impl GsiPlayer {
    fn steam_id(&self) -> Option<String> {
        let id = match self.steamid.as_ref()? {
            Value::String(s) => s.trim().to_owned(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!id.is_empty()).then_some(id)
    }
}

impl GsiPayload {
    /// Spectated player id and display name.
    ///
    /// The id comes from `player`, then `provider`, then `allplayers`.
    /// The name only ever comes from `player`.
    pub fn focused_player(&self) -> Option<(PlayerId, String)> {
        let id = [&self.player, &self.provider, &self.allplayers]
            .into_iter()
            .flatten()
            .find_map(GsiPlayer::steam_id)?;

        let name = self
            .player
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNKNOWN_PLAYER)
            .to_owned();

        Some((PlayerId::new(id), name))
    }

    fn token(&self) -> Option<&str> {
        self.auth.as_ref()?.token.as_deref()
    }
}

/// Check the shared secret from the header, the query string, or the
/// payload's `auth` block.
fn authorize(
    expected: Option<&str>,
    headers: &HeaderMap,
    query: &TokenQuery,
    payload: &GsiPayload,
) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let presented = [
        headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()),
        query.token.as_deref(),
        payload.token(),
    ];
    if presented.into_iter().flatten().any(|t| t == expected) {
        Ok(())
    } else {
        warn!("GSI post rejected: bad token");
        Err(ApiError::Unauthorized)
    }
}

fn status_for(outcome: &FocusOutcome) -> StatusCode {
    match outcome {
        FocusOutcome::Ignored => StatusCode::NO_CONTENT,
        FocusOutcome::Routed {
            switch: SwitchOutcome::Skipped,
            ..
        }
        | FocusOutcome::Bound {
            switch: SwitchOutcome::Skipped,
            ..
        } => StatusCode::ACCEPTED,
        FocusOutcome::Unmapped { hide } if hide.skipped => StatusCode::ACCEPTED,
        _ => StatusCode::OK,
    }
}

pub async fn receive(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload: GsiPayload = if body.is_empty() {
        GsiPayload::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid GSI payload: {e}")))?
    };

    authorize(state.gsi_token.as_deref(), &headers, &query, &payload)?;

    let Some((player, name)) = payload.focused_player() else {
        debug!("GSI post without a player id");
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let outcome = state.router.on_player_focus(player, name).await?;
    if let FocusOutcome::Bound { player, source, .. } = &outcome {
        info!(player = %player, source = %source, "bind captured, saving mapping");
        state
            .update_mapping(|m| {
                m.insert(player.clone(), source.clone());
            })
            .await?;
    }

    let status = status_for(&outcome);
    if status == StatusCode::NO_CONTENT {
        return Ok(status.into_response());
    }
    Ok((status, Json(outcome)).into_response())
}
