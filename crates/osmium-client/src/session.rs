//! Server session lifecycle

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::connection::{self, SessionConnection};
use crate::error::{ClientError, Result};
use crate::protocol;
use crate::transport::{self, ChannelGuard, ModuleHost};
use crate::types::{
    DocumentSelector, SessionIdentity, SessionState, TransportDescriptor,
};
use crate::watch::{WatchPatternSet, WatchRouter};

/// Resources owned by a running session
struct LiveSession {
    connection: Arc<SessionConnection>,
    guard: Option<ChannelGuard>,
    forward_task: JoinHandle<()>,
}

/// One server connection lifecycle: transport, document scope, watch
/// patterns, and protocol client.
///
/// `start` issues the launch and returns without waiting for the handshake;
/// there is no orchestrator-level timeout, so a server that never answers
/// leaves the session in `Starting` until `stop` is called.
pub struct ServerSession {
    identity: SessionIdentity,
    descriptor: TransportDescriptor,
    selector: DocumentSelector,
    watch_patterns: WatchPatternSet,
    await_on_stop: bool,
    router: Arc<WatchRouter>,
    modules: Arc<ModuleHost>,
    state: Arc<RwLock<SessionState>>,
    live: Arc<Mutex<Option<LiveSession>>>,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
    // Incremented per launch; a stale launch task must not touch shared
    // state once a newer launch owns the session
    generation: Arc<AtomicU64>,
}

impl ServerSession {
    /// Create an unstarted session
    pub fn new(
        identity: SessionIdentity,
        descriptor: TransportDescriptor,
        selector: DocumentSelector,
        watch_patterns: WatchPatternSet,
        await_on_stop: bool,
        router: Arc<WatchRouter>,
        modules: Arc<ModuleHost>,
    ) -> Self {
        Self {
            identity,
            descriptor,
            selector,
            watch_patterns,
            await_on_stop,
            router,
            modules,
            state: Arc::new(RwLock::new(SessionState::Unstarted)),
            live: Arc::new(Mutex::new(None)),
            cancel: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Session identity (machine id and display name)
    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Transport descriptor this session launches from
    pub fn descriptor(&self) -> &TransportDescriptor {
        &self.descriptor
    }

    /// Document scope filter for this session
    pub fn selector(&self) -> &DocumentSelector {
        &self.selector
    }

    /// Watch patterns owned by this session
    pub fn watch_patterns(&self) -> &WatchPatternSet {
        &self.watch_patterns
    }

    /// Whether deactivation awaits this session's stop
    pub fn await_on_stop(&self) -> bool {
        self.await_on_stop
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Issue the session launch.
    ///
    /// Registers the watch subscription, spawns the launch-and-handshake
    /// task, and returns its handle immediately. Handshake success moves the
    /// session to `Running`; failure moves it to `Stopped` and resolves the
    /// handle with the error.
    pub async fn start(&self, root: Option<PathBuf>) -> Result<JoinHandle<Result<()>>> {
        {
            let mut state = self.state.write().await;
            match *state {
                SessionState::Unstarted | SessionState::Stopped => {
                    *state = SessionState::Starting;
                }
                other => {
                    return Err(ClientError::InvalidState {
                        session: self.identity.id.clone(),
                        state: other,
                    });
                }
            }
        }

        // Scoped subscription is registered before the launch so config
        // changes during startup are not lost
        let events = self.router.subscribe(&self.identity.id, &self.watch_patterns);

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        *self.cancel.lock().await = Some(cancel_tx);

        info!(
            session = %self.identity.id,
            artifact = %self.descriptor.run.location.display(),
            "starting server session"
        );

        let identity = self.identity.clone();
        let variant = self.descriptor.run.clone();
        let modules = self.modules.clone();
        let router = self.router.clone();
        let state = self.state.clone();
        let live = self.live.clone();
        let root_uri = root.as_deref().and_then(|p| Url::from_file_path(p).ok());
        let generation = self.generation.clone();
        let this_generation = generation.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(tokio::spawn(async move {
            let owns_session = |current: &SessionState| {
                *current == SessionState::Starting
                    && generation.load(Ordering::SeqCst) == this_generation
            };

            let (connection, guard) = match establish(&identity, &variant, &modules).await {
                Ok(parts) => parts,
                Err(e) => {
                    error!(session = %identity.id, error = %e, "server launch failed");
                    let mut current = state.write().await;
                    if owns_session(&current) {
                        *current = SessionState::Stopped;
                        drop(current);
                        router.unsubscribe(&identity.id);
                    }
                    return Err(e);
                }
            };

            let outcome = {
                let handshake = connection::handshake(&connection, &identity, root_uri.as_ref());
                tokio::pin!(handshake);
                tokio::select! {
                    result = &mut handshake => Some(result),
                    _ = &mut cancel_rx => None,
                }
            };

            match outcome {
                Some(Ok(())) => {
                    let mut current = state.write().await;
                    if !owns_session(&current) {
                        // stop() or a restart won the race; release everything
                        drop(current);
                        connection.close().await;
                        guard.shutdown().await;
                        return Ok(());
                    }

                    let connection = Arc::new(connection);
                    let forward_task =
                        spawn_watch_forwarder(identity.id.clone(), connection.clone(), events);
                    *live.lock().await = Some(LiveSession {
                        connection,
                        guard: Some(guard),
                        forward_task,
                    });
                    *current = SessionState::Running;
                    info!(session = %identity.id, "server session running");
                    Ok(())
                }
                Some(Err(e)) => {
                    error!(session = %identity.id, error = %e, "handshake failed");
                    connection.close().await;
                    guard.shutdown().await;
                    let mut current = state.write().await;
                    if owns_session(&current) {
                        *current = SessionState::Stopped;
                        drop(current);
                        router.unsubscribe(&identity.id);
                    }
                    Err(e)
                }
                None => {
                    debug!(session = %identity.id, "launch cancelled before handshake completed");
                    connection.close().await;
                    guard.shutdown().await;
                    Ok(())
                }
            }
        }))
    }

    /// Stop the session, releasing its process or channel and deregistering
    /// its watch subscription. Idempotent: stopping an unstarted or already
    /// stopped session is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let cancel = self.cancel.lock().await.take();

        {
            let mut state = self.state.write().await;
            match *state {
                SessionState::Unstarted | SessionState::Stopped | SessionState::Stopping => {
                    return Ok(());
                }
                SessionState::Starting => {
                    // Cancel the in-flight launch; the launch task releases
                    // the channel when it observes the cancellation
                    *state = SessionState::Stopped;
                    drop(state);
                    self.router.unsubscribe(&self.identity.id);
                    if let Some(cancel) = cancel {
                        let _ = cancel.send(());
                    }
                    debug!(session = %self.identity.id, "session stopped before handshake completed");
                    return Ok(());
                }
                SessionState::Running => {
                    *state = SessionState::Stopping;
                }
            }
        }

        debug!(session = %self.identity.id, "stopping server session");
        self.router.unsubscribe(&self.identity.id);

        let live = self.live.lock().await.take();
        if let Some(mut live) = live {
            live.forward_task.abort();
            // Best-effort exit notice before the channel goes away
            let _ = live.connection.notify("exit", None).await;
            live.connection.close().await;
            if let Some(guard) = live.guard.take() {
                guard.shutdown().await;
            }
        }

        *self.state.write().await = SessionState::Stopped;
        info!(session = %self.identity.id, "server session stopped");
        Ok(())
    }

    /// Deliver a `textDocument/didOpen` to this session's server if the
    /// document is in scope and the session is running. Returns whether the
    /// notification was delivered.
    pub async fn open_document(&self, uri: &Url, language: &str, text: &str) -> Result<bool> {
        if !self.selector.matches(uri.scheme(), language) {
            return Ok(false);
        }
        if *self.state.read().await != SessionState::Running {
            return Ok(false);
        }

        let live = self.live.lock().await;
        if let Some(live) = live.as_ref() {
            live.connection
                .notify(
                    "textDocument/didOpen",
                    Some(protocol::did_open_params(uri, language, 1, text)),
                )
                .await?;
            return Ok(true);
        }
        Ok(false)
    }
}

async fn establish(
    identity: &SessionIdentity,
    variant: &crate::types::TransportVariant,
    modules: &ModuleHost,
) -> Result<(SessionConnection, ChannelGuard)> {
    let channel = transport::launch(variant, modules).await?;
    let (reader, writer, guard) = channel.into_parts();
    let connection = SessionConnection::new(&identity.id, reader, writer);
    Ok((connection, guard))
}

fn spawn_watch_forwarder(
    session_id: String,
    connection: Arc<SessionConnection>,
    mut events: mpsc::UnboundedReceiver<PathBuf>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(path) = events.recv().await {
            let uri = match Url::from_file_path(&path) {
                Ok(uri) => uri,
                Err(_) => {
                    warn!(session = %session_id, path = %path.display(), "cannot convert watched path to URI");
                    continue;
                }
            };
            let params: Value = protocol::did_change_watched_files_params(&[uri]);
            if let Err(e) = connection
                .notify("workspace/didChangeWatchedFiles", Some(params))
                .await
            {
                warn!(session = %session_id, error = %e, "failed to forward watched file change");
            }
        }
    })
}
