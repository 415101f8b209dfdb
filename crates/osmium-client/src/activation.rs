//! Activation and deactivation of the editor integration

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::registry::{Launch, SessionRegistry};
use crate::session::ServerSession;
use crate::transport::ModuleHost;
use crate::types::{DocumentSelector, SessionIdentity, TransportDescriptor};
use crate::watch::{WatchPatternSet, WatchRouter};
use crate::workspace::{self, DocumentHost};

/// What the host runtime provides at activation time
#[derive(Debug, Clone)]
pub struct ActivationContext {
    /// The integration's install location; server artifacts resolve
    /// against it
    pub install_root: PathBuf,
    /// Currently open workspace folders, in the host's order
    pub workspace_folders: Vec<PathBuf>,
}

struct ActiveState {
    registry: SessionRegistry,
    // Held for the lifetime of the activation; dropping it releases the
    // filesystem watcher backend
    _router: Arc<WatchRouter>,
}

/// Entry point wired to the host runtime's activate/deactivate hooks.
///
/// Activation builds the transport descriptors, constructs the sessions,
/// issues every launch, and then opens the workspace's sources for analysis
/// without waiting for any session to reach `Running`. Activating twice
/// without an intervening deactivation is a caller error.
pub struct EditorIntegration {
    config: ClientConfig,
    host: Arc<dyn DocumentHost>,
    modules: Arc<ModuleHost>,
    active: Option<ActiveState>,
}

impl EditorIntegration {
    /// Create an inactive integration from a validated configuration
    pub fn new(
        config: ClientConfig,
        host: Arc<dyn DocumentHost>,
        modules: Arc<ModuleHost>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            host,
            modules,
            active: None,
        })
    }

    /// Whether the integration is currently active
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// The active session registry, if activated
    pub fn registry(&self) -> Option<&SessionRegistry> {
        self.active.as_ref().map(|state| &state.registry)
    }

    /// Activate the integration.
    ///
    /// Returns the issued launches; each handle resolves with its session's
    /// launch outcome so the host can surface failures. Bootstrapping does
    /// not wait for handshakes, and a discovery failure is reported without
    /// undoing the activation.
    pub async fn activate(&mut self, context: &ActivationContext) -> Result<Vec<Launch>> {
        if self.active.is_some() {
            return Err(ClientError::AlreadyActive);
        }

        info!(
            install_root = %context.install_root.display(),
            folders = context.workspace_folders.len(),
            "activating editor integration"
        );

        let router = Arc::new(WatchRouter::new());
        for folder in &context.workspace_folders {
            if let Err(e) = router.watch(folder) {
                warn!(folder = %folder.display(), error = %e, "failed to watch workspace folder");
            }
        }

        let mut sessions = Vec::with_capacity(self.config.sessions.len());
        for session_config in &self.config.sessions {
            let descriptor = TransportDescriptor::build(
                &context.install_root,
                &session_config.artifact,
                session_config.mode,
            );
            let patterns = WatchPatternSet::new(session_config.watch.iter().cloned())?;
            sessions.push(Arc::new(ServerSession::new(
                SessionIdentity {
                    id: session_config.id.clone(),
                    name: session_config.name.clone(),
                },
                descriptor,
                DocumentSelector::new("file", &self.config.language),
                patterns,
                session_config.await_on_stop,
                router.clone(),
                self.modules.clone(),
            )));
        }

        let registry = SessionRegistry::new(sessions);
        let root = context.workspace_folders.first().map(PathBuf::as_path);
        let launches = registry.start_all(root).await;

        match workspace::bootstrap(self.host.clone(), &context.workspace_folders).await {
            Ok(issued) => debug!(count = issued, "initial open requests issued"),
            Err(e) => warn!(error = %e, "workspace file discovery failed"),
        }

        self.active = Some(ActiveState {
            registry,
            _router: router,
        });
        Ok(launches)
    }

    /// Deactivate the integration.
    ///
    /// Returns `Ok(false)` immediately when nothing was ever activated.
    /// Otherwise delegates to the registry's stop policy and reports its
    /// aggregate signal; only awaited sessions' stop failures surface here.
    pub async fn deactivate(&mut self) -> Result<bool> {
        let Some(state) = self.active.take() else {
            debug!("deactivate requested with no active integration");
            return Ok(false);
        };

        info!("deactivating editor integration");
        state.registry.stop_all().await?;
        Ok(true)
    }

    /// Forward a document the host just opened to every running session
    /// whose scope filter matches. Returns how many sessions received it.
    pub async fn document_opened(&self, uri: &Url, language: &str, text: &str) -> usize {
        match &self.active {
            Some(state) => state.registry.open_document(uri, language, text).await,
            None => 0,
        }
    }
}
