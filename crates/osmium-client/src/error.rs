//! Error types for the client orchestrator

use std::path::PathBuf;

use thiserror::Error;

use crate::types::SessionState;

/// Result type for client orchestration operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised by the client orchestrator
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server artifact could not be resolved at launch time
    #[error("transport resolution failed: {0}")]
    TransportResolution(String),

    /// The server process could not be spawned
    #[error("failed to spawn server process at {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The protocol handshake with the server failed
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A protocol-level failure on an established channel
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O failure on a server channel
    #[error("server channel i/o error: {0}")]
    ChannelIo(#[from] std::io::Error),

    /// File watcher registration or delivery failure
    #[error("file watcher error: {0}")]
    Watcher(String),

    /// Workspace file enumeration failure
    #[error("file discovery failed: {0}")]
    Discovery(String),

    /// An operation was issued in a lifecycle state that does not permit it
    #[error("session '{session}' cannot perform this operation in state {state:?}")]
    InvalidState {
        session: String,
        state: SessionState,
    },

    /// Activation was requested while the integration is already active
    #[error("integration is already active; deactivate before activating again")]
    AlreadyActive,

    /// Invalid client configuration
    #[error("configuration error: {0}")]
    Config(String),
}
