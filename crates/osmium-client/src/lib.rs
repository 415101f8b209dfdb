//! Editor-side client orchestration for the Osmium Solidity toolchain
//!
//! This crate connects a host editor session to the Osmium Solidity analysis
//! servers. It discovers the workspace's Solidity sources, launches and
//! supervises one independent protocol client per server, scopes document and
//! config-file events to the session that owns them, and tears everything
//! down on deactivation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     EditorIntegration                        │
//! │  activate / deactivate, wired to the host runtime's hooks    │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────┐      ┌───────────────────────────┐   │
//! │  │  SessionRegistry   │      │  Workspace bootstrap      │   │
//! │  │  (core, foundry)   │      │  (**/*.sol discovery)     │   │
//! │  └────────┬───────────┘      └─────────────┬─────────────┘   │
//! │           │                                │                 │
//! │  ┌────────▼───────────┐      ┌─────────────▼─────────────┐   │
//! │  │  ServerSession     │      │  DocumentHost             │   │
//! │  │  state machine +   │      │  (host document model)    │   │
//! │  │  protocol client   │      └───────────────────────────┘   │
//! │  └────────┬───────────┘                                      │
//! │           │                                                  │
//! │  ┌────────▼───────────┐      ┌───────────────────────────┐   │
//! │  │  Transport launch  │      │  WatchRouter              │   │
//! │  │  ipc module / stdio│      │  per-session file events  │   │
//! │  │  binary            │      └───────────────────────────┘   │
//! │  └────────────────────┘                                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each session is an independent failure domain: a launch or handshake
//! failure in one never blocks the other. Deactivation awaits only the
//! sessions configured to be awaited and stops the rest in the background,
//! so the host gets a prompt completion signal.

pub mod activation;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;
pub mod watch;
pub mod workspace;

pub use activation::{ActivationContext, EditorIntegration};
pub use config::{ClientConfig, SessionConfig};
pub use connection::SessionConnection;
pub use error::{ClientError, Result};
pub use registry::{Launch, SessionRegistry};
pub use session::ServerSession;
pub use transport::{launch, ChannelGuard, ModuleHost, ServerChannel};
pub use types::{
    DocumentSelector, ExecutionMode, SessionIdentity, SessionState, TransportDescriptor,
    TransportKind, TransportVariant,
};
pub use watch::{WatchPatternSet, WatchRouter};
pub use workspace::{bootstrap, discover_sources, DocumentHost};
