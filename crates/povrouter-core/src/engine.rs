// ── Routing engine ──
//
// One worker task owns the focus router and processes every
// routing-affecting request in submission order. HTTP handlers talk to
// it through a cheaply cloneable `RouterHandle`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use povrouter_api::ConnectionState;

use crate::backend::SceneBackend;
use crate::config::RouterConfig;
use crate::error::CoreError;
use crate::model::{Mapping, PlayerFocusEvent, PlayerId, SceneItem};
use crate::notify::{Notification, Notifier, RouterSnapshot};
use crate::router::{FocusOutcome, FocusRouter};
use crate::stream::NotificationStream;
use crate::switcher::SwitchOutcome;
use crate::topology::TopologyCache;

const COMMAND_CHANNEL_SIZE: usize = 64;
const NOTIFY_CHANNEL_SIZE: usize = 256;

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug)]
enum RouteCommand {
    Focus(PlayerFocusEvent),
    ForceSwitch(String),
    MappingChanged(Mapping),
    ArmBind(Option<String>),
    InvalidateTopology,
    Topology,
}

impl RouteCommand {
    /// Short subject for error reports.
    fn subject(&self) -> String {
        match self {
            Self::Focus(event) => event.player_id.to_string(),
            Self::ForceSwitch(source) => source.clone(),
            Self::MappingChanged(_) => "mapping".into(),
            Self::ArmBind(source) => source.clone().unwrap_or_else(|| "bind".into()),
            Self::InvalidateTopology | Self::Topology => "topology".into(),
        }
    }
}

#[derive(Debug)]
enum RouteResult {
    Focus(FocusOutcome),
    Switch(SwitchOutcome),
    Topology(Arc<Vec<SceneItem>>),
    Done,
}

struct RouteEnvelope {
    command: RouteCommand,
    response_tx: oneshot::Sender<Result<RouteResult, CoreError>>,
}

// ── RouterHandle ─────────────────────────────────────────────────────

/// Entry point for everything outside the worker.
#[derive(Clone)]
pub struct RouterHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    command_tx: mpsc::Sender<RouteEnvelope>,
    notifier: Notifier,
    scene: String,
    cancel: CancellationToken,
}

impl RouterHandle {
    /// Spawn the routing worker. Must be called inside a Tokio runtime.
    pub fn spawn<B: SceneBackend>(
        backend: Arc<B>,
        config: RouterConfig,
        mapping: Mapping,
        cancel: CancellationToken,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let notifier = Notifier::new(
            NOTIFY_CHANNEL_SIZE,
            RouterSnapshot {
                mapping: mapping.clone(),
                ..RouterSnapshot::default()
            },
        );
        let cache = Arc::new(TopologyCache::new(config.max_nesting_depth));
        let connection = backend.connection_state();

        let router = FocusRouter::new(backend, &config, cache, mapping, notifier.clone());
        tokio::spawn(routing_worker(router, command_rx, connection, cancel.clone()));

        info!(scene = %config.scene, "routing worker started");

        Self {
            inner: Arc::new(HandleInner {
                command_tx,
                notifier,
                scene: config.scene,
                cancel,
            }),
        }
    }

    pub fn scene(&self) -> &str {
        &self.inner.scene
    }

    // ── Routing requests ─────────────────────────────────────────────

    /// Queue a focus event and wait for the worker to process it.
    pub async fn on_player_focus(
        &self,
        player_id: PlayerId,
        display_name: impl Into<String>,
    ) -> Result<FocusOutcome, CoreError> {
        let event = PlayerFocusEvent::new(player_id, display_name);
        match self.execute(RouteCommand::Focus(event)).await? {
            RouteResult::Focus(outcome) => Ok(outcome),
            other => Err(unexpected(&other)),
        }
    }

    /// Activate `source` now, bypassing mapping and debounce.
    pub async fn force_switch(&self, source: impl Into<String>) -> Result<SwitchOutcome, CoreError> {
        match self.execute(RouteCommand::ForceSwitch(source.into())).await? {
            RouteResult::Switch(outcome) => Ok(outcome),
            other => Err(unexpected(&other)),
        }
    }

    /// Replace the router's mapping. No switch happens until the next event.
    pub async fn on_mapping_changed(&self, mapping: Mapping) -> Result<(), CoreError> {
        self.execute(RouteCommand::MappingChanged(mapping))
            .await
            .map(|_| ())
    }

    /// Bind the next accepted player to `source`. `None` disarms.
    pub async fn arm_bind(&self, source: Option<String>) -> Result<(), CoreError> {
        self.execute(RouteCommand::ArmBind(source))
            .await
            .map(|_| ())
    }

    /// Drop the cached topology; the next activation refetches.
    pub async fn invalidate_topology(&self) -> Result<(), CoreError> {
        self.execute(RouteCommand::InvalidateTopology)
            .await
            .map(|_| ())
    }

    async fn execute(&self, command: RouteCommand) -> Result<RouteResult, CoreError> {
        let (tx, rx) = oneshot::channel();

        self.inner
            .command_tx
            .send(RouteEnvelope {
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::RouterUnavailable)?;

        rx.await.map_err(|_| CoreError::RouterUnavailable)?
    }

    /// Items of the router scene, fetching them if nothing is cached.
    pub async fn topology(&self) -> Result<Arc<Vec<SceneItem>>, CoreError> {
        match self.execute(RouteCommand::Topology).await? {
            RouteResult::Topology(items) => Ok(items),
            other => Err(unexpected(&other)),
        }
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Notification>> {
        self.inner.notifier.subscribe()
    }

    /// Notifications as a `Stream` that skips over lag.
    pub fn notifications(&self) -> NotificationStream {
        NotificationStream::new(self.subscribe())
    }

    pub fn snapshot(&self) -> RouterSnapshot {
        self.inner.notifier.current()
    }

    /// Push an out-of-band notification (e.g. heartbeat) to subscribers.
    pub fn publish(&self, notification: Notification) {
        self.inner.notifier.publish(notification);
    }

    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

fn unexpected(result: &RouteResult) -> CoreError {
    CoreError::Internal(format!("unexpected routing result: {result:?}"))
}

// ── Worker ───────────────────────────────────────────────────────────

async fn routing_worker<B: SceneBackend>(
    mut router: FocusRouter<B>,
    mut rx: mpsc::Receiver<RouteEnvelope>,
    mut connection: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
) {
    let mut watching = true;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = connection.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                    continue;
                }
                // Coalesced updates may hide a drop; any change that lands on
                // Connected means item ids may have been reissued.
                let state = *connection.borrow_and_update();
                if state == ConnectionState::Connected {
                    info!("OBS connected, dropping cached topology");
                    router.invalidate_topology().await;
                } else {
                    debug!(%state, "OBS connection state changed");
                }
            }
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let subject = envelope.command.subject();
                let result = AssertUnwindSafe(route_command(&mut router, envelope.command))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        let reason = panic_message(panic.as_ref());
                        error!(subject = %subject, reason = %reason, "routing command panicked");
                        Err(CoreError::ToggleFailed {
                            source_name: subject,
                            reason,
                        })
                    });
                let _ = envelope.response_tx.send(result);
            }
        }
    }

    debug!("routing worker exiting");
}

async fn route_command<B: SceneBackend>(
    router: &mut FocusRouter<B>,
    command: RouteCommand,
) -> Result<RouteResult, CoreError> {
    let result = match command {
        RouteCommand::Focus(event) => RouteResult::Focus(router.handle_focus(event).await),
        RouteCommand::ForceSwitch(source) => {
            RouteResult::Switch(router.force_switch(&source).await)
        }
        RouteCommand::MappingChanged(mapping) => {
            router.mapping_changed(mapping);
            RouteResult::Done
        }
        RouteCommand::ArmBind(source) => {
            router.arm_bind(source);
            RouteResult::Done
        }
        RouteCommand::InvalidateTopology => {
            router.invalidate_topology().await;
            RouteResult::Done
        }
        RouteCommand::Topology => RouteResult::Topology(router.topology().await),
    };
    Ok(result)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".into()
    }
}
