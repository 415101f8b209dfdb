//! Core data structures for the client orchestrator

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a server artifact is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// An in-process module driven over an in-memory channel
    Module,
    /// An external executable driven over its standard streams
    Binary,
}

/// The channel mechanism connecting the client to a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// In-memory duplex channel to an in-process module
    Ipc,
    /// Standard input/output streams of a child process
    Stdio,
}

/// One launchable configuration of a server artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportVariant {
    /// Resolved artifact location
    pub location: PathBuf,
    /// Channel mechanism for this variant
    pub kind: TransportKind,
    /// Whether inspection is enabled (debug variants only)
    pub inspect: bool,
}

/// Paired run and debug launch configurations for one server.
///
/// Both variants always target the same artifact; only flags may differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportDescriptor {
    /// Variant used for normal execution
    pub run: TransportVariant,
    /// Variant used when the host runs the integration under a debugger
    pub debug: TransportVariant,
}

/// Predicate selecting which open documents a session's server receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSelector {
    /// URI scheme, e.g. "file"
    pub scheme: String,
    /// Language identifier, e.g. "solidity"
    pub language: String,
}

impl DocumentSelector {
    /// Create a selector for the given scheme and language
    pub fn new(scheme: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            language: language.into(),
        }
    }

    /// Whether a document with the given scheme and language is in scope
    pub fn matches(&self, scheme: &str, language: &str) -> bool {
        self.scheme == scheme && self.language == language
    }
}

/// Stable identity of a server session, surfaced to the host's UI and logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Machine identifier, stable across versions
    pub id: String,
    /// Human-readable display name
    pub name: String,
}

/// Lifecycle state of a server session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Never started
    Unstarted,
    /// Launch issued, handshake not yet complete
    Starting,
    /// Handshake complete, session live
    Running,
    /// Explicit deactivation in progress
    Stopping,
    /// Stopped, either after deactivation or on launch failure
    Stopped,
}
