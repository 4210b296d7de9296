//! One-shot listing of the router scene.

use std::time::Duration;

use serde::Serialize;
use tabled::Tabled;
use tokio_util::sync::CancellationToken;

use povrouter_api::ObsClient;
use povrouter_core::switcher::SourceSwitcher;
use povrouter_core::topology::fetch_topology;
use povrouter_core::{CoreError, SceneItem};

use crate::cli::{GlobalOpts, SourcesArgs};
use crate::commands::load;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct SourceEntry {
    #[serde(flatten)]
    item: SceneItem,
    camera: bool,
}

#[derive(Tabled)]
struct SourceRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Kind")]
    kind: &'static str,
}

fn to_row(entry: &SourceEntry, color: bool) -> SourceRow {
    let kind = match (entry.item.is_container, entry.camera) {
        (true, _) => "group",
        (false, true) => "camera",
        (false, false) => "source",
    };
    let source = if entry.camera {
        output::camera(&entry.item.source_name, color)
    } else {
        entry.item.source_name.clone()
    };
    SourceRow {
        source,
        container: output::muted(&entry.item.container_scene, color),
        id: entry.item.item_id.to_string(),
        kind,
    }
}

pub async fn handle(args: SourcesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (_, cfg) = load(global)?;
    let session = cfg.session_config()?;
    let router = cfg.router_config()?;
    let scene = args.scene.unwrap_or_else(|| router.scene.clone());
    let url = session.url.to_string();

    let client = ObsClient::connect(session, CancellationToken::new());
    if !client.wait_ready(Duration::from_secs(args.wait)).await {
        client.shutdown();
        return Err(CliError::ConnectionFailed { url });
    }

    let listing = async {
        let version = client.get_version().await.map_err(CoreError::from)?;
        tracing::info!(
            obs = %version.obs_version,
            websocket = %version.obs_web_socket_version,
            "connected to OBS"
        );
        fetch_topology(&client, &scene, router.max_nesting_depth).await
    }
    .await;
    client.shutdown();
    let items = listing?;

    if items.is_empty() {
        return Err(CliError::SceneEmpty { scene });
    }

    let switcher = SourceSwitcher::new(&router);
    let entries: Vec<SourceEntry> = items
        .into_iter()
        .map(|item| SourceEntry {
            camera: !item.is_container && switcher.is_camera(&item.source_name),
            item,
        })
        .collect();

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &entries,
        |e| to_row(e, color),
        |e| e.item.source_name.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
