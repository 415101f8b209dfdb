//! Transport descriptors and server channel launch

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::types::{ExecutionMode, TransportDescriptor, TransportKind, TransportVariant};

/// Channel capacity for in-process module transports
const IPC_CHANNEL_CAPACITY: usize = 64 * 1024;

/// Bound on waiting for a killed server process to exit
const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

impl TransportDescriptor {
    /// Build a descriptor for an artifact relative to the install root.
    ///
    /// Module artifacts use the in-memory ipc channel, binaries use their
    /// standard streams; run and debug variants target the same artifact.
    /// The artifact's existence is not checked here; a missing artifact
    /// surfaces as a launch failure at session start.
    pub fn build(install_root: &Path, artifact: &Path, mode: ExecutionMode) -> Self {
        let location = install_root.join(artifact);
        let kind = match mode {
            ExecutionMode::Module => TransportKind::Ipc,
            ExecutionMode::Binary => TransportKind::Stdio,
        };

        Self {
            run: TransportVariant {
                location: location.clone(),
                kind,
                inspect: false,
            },
            debug: TransportVariant {
                location,
                kind,
                inspect: mode == ExecutionMode::Module,
            },
        }
    }
}

/// Future driving one in-process module server
pub type ModuleFuture = BoxFuture<'static, ()>;

/// Entry function of an in-process module server
pub type ModuleEntry = Arc<dyn Fn(DuplexStream) -> ModuleFuture + Send + Sync>;

/// Registry resolving in-process module artifacts to their entry functions.
///
/// The host runtime registers each bundled module under its artifact path;
/// launching an ipc transport looks the entry up by the descriptor's
/// location. An unregistered path fails at launch, mirroring a missing
/// binary.
#[derive(Default)]
pub struct ModuleHost {
    entries: RwLock<HashMap<PathBuf, ModuleEntry>>,
}

impl ModuleHost {
    /// Create an empty module host
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module entry under an artifact path
    pub fn register<P, F, Fut>(&self, artifact: P, entry: F)
    where
        P: Into<PathBuf>,
        F: Fn(DuplexStream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let entry: ModuleEntry = Arc::new(move |stream| -> ModuleFuture { Box::pin(entry(stream)) });
        self.entries
            .write()
            .expect("module host lock poisoned")
            .insert(artifact.into(), entry);
    }

    /// Resolve the entry registered under an artifact path
    pub fn resolve(&self, artifact: &Path) -> Option<ModuleEntry> {
        self.entries
            .read()
            .expect("module host lock poisoned")
            .get(artifact)
            .cloned()
    }
}

/// Owner of the process or task backing a launched channel
pub enum ChannelGuard {
    /// External server process
    Process(Child),
    /// In-process module server task
    Module(JoinHandle<()>),
}

impl ChannelGuard {
    /// Release the underlying process or task.
    ///
    /// Processes are killed and waited on with a bounded timeout; module
    /// tasks are aborted.
    pub async fn shutdown(self) {
        match self {
            ChannelGuard::Process(mut child) => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill server process");
                }
                match tokio::time::timeout(SHUTDOWN_WAIT, child.wait()).await {
                    Ok(Ok(status)) => {
                        debug!(status = ?status, "server process exited");
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "error waiting for server process to exit");
                    }
                    Err(_) => {
                        warn!("timeout waiting for server process to exit");
                    }
                }
            }
            ChannelGuard::Module(task) => {
                task.abort();
            }
        }
    }
}

/// A launched server channel: framed reader/writer halves plus the owner of
/// the backing process or task
pub struct ServerChannel {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    guard: ChannelGuard,
}

impl std::fmt::Debug for ServerChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerChannel").finish_non_exhaustive()
    }
}

impl ServerChannel {
    /// Split the channel into its reader, writer, and guard
    pub fn into_parts(
        self,
    ) -> (
        Box<dyn AsyncRead + Send + Unpin>,
        Box<dyn AsyncWrite + Send + Unpin>,
        ChannelGuard,
    ) {
        (self.reader, self.writer, self.guard)
    }
}

/// Launch a server channel for one transport variant
pub async fn launch(variant: &TransportVariant, modules: &ModuleHost) -> Result<ServerChannel> {
    match variant.kind {
        TransportKind::Stdio => launch_binary(variant),
        TransportKind::Ipc => launch_module(variant, modules),
    }
}

fn launch_binary(variant: &TransportVariant) -> Result<ServerChannel> {
    if !variant.location.exists() {
        return Err(ClientError::TransportResolution(format!(
            "server binary not found: {}",
            variant.location.display()
        )));
    }

    let mut cmd = Command::new(&variant.location);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| ClientError::Spawn {
        path: variant.location.clone(),
        source: e,
    })?;

    info!(
        path = %variant.location.display(),
        pid = ?child.id(),
        "server process spawned"
    );

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| ClientError::Protocol("server stdin not captured".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ClientError::Protocol("server stdout not captured".to_string()))?;

    Ok(ServerChannel {
        reader: Box::new(stdout),
        writer: Box::new(stdin),
        guard: ChannelGuard::Process(child),
    })
}

fn launch_module(variant: &TransportVariant, modules: &ModuleHost) -> Result<ServerChannel> {
    let entry = modules.resolve(&variant.location).ok_or_else(|| {
        ClientError::TransportResolution(format!(
            "no module registered at: {}",
            variant.location.display()
        ))
    })?;

    let (client_side, server_side) = tokio::io::duplex(IPC_CHANNEL_CAPACITY);
    let task = tokio::spawn(entry(server_side));

    info!(path = %variant.location.display(), "module server task started");

    let (reader, writer) = tokio::io::split(client_side);
    Ok(ServerChannel {
        reader: Box::new(reader),
        writer: Box::new(writer),
        guard: ChannelGuard::Module(task),
    })
}
