//! HTTP surface: GSI webhook, control API, WebSocket push and the
//! optional dashboard.

mod api;
mod gsi;
mod push;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use povrouter_api::ObsClient;
use povrouter_config::{ConfigError, MappingFile};
use povrouter_core::{CoreError, Mapping, Notification, RouterHandle};

// ── State ────────────────────────────────────────────────────────────

pub struct AppState {
    pub router: RouterHandle,
    pub obs: ObsClient,
    pub mapping_file: MappingFile,
    /// Shared secret GSI posts must carry, if set.
    pub gsi_token: Option<String>,
    /// Held for the whole of a mapping edit.
    mapping_lock: Mutex<()>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        router: RouterHandle,
        obs: ObsClient,
        mapping_file: MappingFile,
        gsi_token: Option<String>,
    ) -> SharedState {
        Arc::new(Self {
            router,
            obs,
            mapping_file,
            gsi_token: gsi_token.filter(|t| !t.is_empty()),
            mapping_lock: Mutex::new(()),
        })
    }

    /// Apply `edit` to the current mapping, persist it, then hand it to
    /// the router.
    pub async fn update_mapping(
        &self,
        edit: impl FnOnce(&mut Mapping),
    ) -> Result<Mapping, ApiError> {
        let _guard = self.mapping_lock.lock().await;
        let mut mapping = self.router.snapshot().mapping;
        edit(&mut mapping);
        self.mapping_file.save(&mapping)?;
        self.router.on_mapping_changed(mapping.clone()).await?;
        Ok(mapping)
    }

    /// Re-read the mapping file and refetch the scene on next use.
    pub async fn reload_mapping(&self) -> Result<Mapping, ApiError> {
        let _guard = self.mapping_lock.lock().await;
        let mapping = self.mapping_file.load()?;
        self.router.on_mapping_changed(mapping.clone()).await?;
        self.router.invalidate_topology().await?;
        Ok(mapping)
    }
}

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("invalid or missing GSI token")]
    Unauthorized,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Mapping(#[from] ConfigError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Core(CoreError::RouterUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Core(e) if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            Self::Core(_) | Self::Mapping(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// ── Router ───────────────────────────────────────────────────────────

pub fn router(state: SharedState, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/gsi", post(gsi::receive))
        .route("/force/:source", post(api::force_path))
        .route("/api/force", post(api::force_body))
        .route("/api/mapping", get(api::get_mapping).post(api::set_mapping))
        .route("/api/mapping/:steamid", delete(api::delete_mapping))
        .route("/reload-mapping", post(api::reload_mapping))
        .route("/api/bind", post(api::bind))
        .route("/api/state", get(api::routing_state))
        .route("/api/players", get(api::players))
        .route("/api/sources", get(api::sources))
        .route("/health", get(api::health))
        .route("/ws", get(push::upgrade))
        .with_state(state);

    match static_dir {
        Some(dir) if dir.is_dir() => {
            debug!(dir = %dir.display(), "serving dashboard");
            app = app.fallback_service(ServeDir::new(dir));
        }
        Some(dir) => warn!(dir = %dir.display(), "dashboard directory not found, not serving it"),
        None => {}
    }

    app.layer(TraceLayer::new_for_http())
}

/// Serve `app` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

/// Publish a `ping` to push subscribers every `period`.
pub fn spawn_heartbeat(router: RouterHandle, period: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => router.publish(Notification::ping()),
            }
        }
    });
}
