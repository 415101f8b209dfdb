//! Aggregate ownership of the fixed session set

use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::Result;
use crate::session::ServerSession;

/// An issued session launch: the session's id and the handle resolving with
/// the launch outcome
#[derive(Debug)]
pub struct Launch {
    /// Machine id of the launched session
    pub session: String,
    /// Resolves once the launch either reaches `Running` or fails
    pub handle: JoinHandle<Result<()>>,
}

/// Owns the fixed set of server sessions and exposes aggregate start/stop.
///
/// Stop policy: sessions flagged `await_on_stop` are stopped and awaited in
/// registration order, and the first awaited failure becomes the aggregate
/// result; the remaining sessions stop best-effort in background tasks. This
/// asymmetry keeps deactivation prompt even when a secondary session shuts
/// down slowly.
pub struct SessionRegistry {
    sessions: Vec<Arc<ServerSession>>,
}

impl SessionRegistry {
    /// Create a registry over the given sessions
    pub fn new(sessions: Vec<Arc<ServerSession>>) -> Self {
        Self { sessions }
    }

    /// The registered sessions, in registration order
    pub fn sessions(&self) -> &[Arc<ServerSession>] {
        &self.sessions
    }

    /// Issue every session's launch in registration order without waiting
    /// for any handshake. Completion order of the returned handles is
    /// unspecified; a failure in one session never blocks another.
    pub async fn start_all(&self, root: Option<&Path>) -> Vec<Launch> {
        let mut launches = Vec::with_capacity(self.sessions.len());

        for session in &self.sessions {
            let id = session.identity().id.clone();
            match session.start(root.map(Path::to_path_buf)).await {
                Ok(handle) => launches.push(Launch { session: id, handle }),
                Err(e) => {
                    error!(session = %id, error = %e, "failed to issue session launch");
                    launches.push(Launch {
                        session: id,
                        handle: tokio::spawn(async move { Err(e) }),
                    });
                }
            }
        }

        info!(count = launches.len(), "session launches issued");
        launches
    }

    /// Stop every session per the registry's stop policy and return the
    /// aggregate signal
    pub async fn stop_all(&self) -> Result<()> {
        let mut aggregate: Result<()> = Ok(());

        for session in &self.sessions {
            if session.await_on_stop() {
                debug!(session = %session.identity().id, "awaiting session stop");
                let result = session.stop().await;
                if let Err(e) = result {
                    warn!(session = %session.identity().id, error = %e, "awaited session stop failed");
                    if aggregate.is_ok() {
                        aggregate = Err(e);
                    }
                }
            } else {
                let session = session.clone();
                tokio::spawn(async move {
                    if let Err(e) = session.stop().await {
                        warn!(
                            session = %session.identity().id,
                            error = %e,
                            "background session stop failed"
                        );
                    }
                });
            }
        }

        aggregate
    }

    /// Route an opened document to every running session whose scope filter
    /// matches. Returns how many sessions received it.
    pub async fn open_document(&self, uri: &Url, language: &str, text: &str) -> usize {
        let mut delivered = 0;
        for session in &self.sessions {
            match session.open_document(uri, language, text).await {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        session = %session.identity().id,
                        uri = %uri,
                        error = %e,
                        "failed to deliver document open"
                    );
                }
            }
        }
        delivered
    }
}
