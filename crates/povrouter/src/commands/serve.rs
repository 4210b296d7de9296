//! `povrouter serve`: webhook receiver plus routing engine.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use povrouter_api::ObsClient;
use povrouter_config::MappingFile;
use povrouter_core::RouterHandle;

use crate::cli::{GlobalOpts, ServeArgs};
use crate::commands::load;
use crate::error::CliError;
use crate::server::{self, AppState};

pub async fn handle(args: ServeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (config_path, cfg) = load(global)?;
    let session = cfg.session_config()?;
    let router_config = cfg.router_config()?;

    let mapping_file = MappingFile::new(cfg.mapping_path(&config_path));
    let mapping = mapping_file.load()?;
    info!(
        path = %mapping_file.path().display(),
        entries = mapping.len(),
        "mapping loaded"
    );

    if session.password.is_none() {
        warn!("no OBS password configured, identifying without authentication");
    }
    info!(url = %session.url, "connecting to OBS");

    let cancel = CancellationToken::new();
    let obs = ObsClient::connect(session, cancel.child_token());
    let router = RouterHandle::spawn(
        Arc::new(obs.clone()),
        router_config,
        mapping,
        cancel.child_token(),
    );

    let state = AppState::new(router.clone(), obs, mapping_file, cfg.server.gsi_token.clone());
    if state.gsi_token.is_none() {
        warn!("server.gsi_token is not set, accepting GSI posts from anyone");
    }

    let static_dir = args.static_dir.or_else(|| cfg.server.static_dir.clone());
    let app = server::router(state, static_dir.as_deref());

    if cfg.server.heartbeat_secs > 0 {
        server::spawn_heartbeat(
            router.clone(),
            Duration::from_secs(cfg.server.heartbeat_secs),
            cancel.child_token(),
        );
    }

    let addr = args.listen.unwrap_or_else(|| cfg.server.listen.clone());
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| CliError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(addr = %addr, scene = %router.scene(), "povrouter listening");

    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));
    server::serve(listener, app, cancel.clone()).await?;

    cancel.cancel();
    info!("povrouter stopped");
    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("shutdown requested");
            cancel.cancel();
        }
        Err(e) => warn!(error = %e, "cannot listen for ctrl-c"),
    }
}
