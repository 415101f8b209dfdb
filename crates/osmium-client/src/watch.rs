//! Scoped file-change watching and per-session event routing

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// Glob patterns describing the files one session wants change events for
#[derive(Debug, Clone)]
pub struct WatchPatternSet {
    patterns: Vec<String>,
    matcher: GlobSet,
}

impl WatchPatternSet {
    /// Compile a set of glob patterns. At least one pattern is required.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        if patterns.is_empty() {
            return Err(ClientError::Config(
                "watch pattern set must contain at least one pattern".to_string(),
            ));
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| ClientError::Config(format!("invalid watch pattern '{}': {}", pattern, e)))?;
            builder.add(glob);
        }
        let matcher = builder
            .build()
            .map_err(|e| ClientError::Config(format!("failed to compile watch patterns: {}", e)))?;

        Ok(Self { patterns, matcher })
    }

    /// The source patterns
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether a path matches any pattern in the set
    pub fn matches(&self, path: &Path) -> bool {
        self.matcher.is_match(path)
    }
}

struct Subscription {
    matcher: GlobSet,
    tx: mpsc::UnboundedSender<PathBuf>,
}

/// Routes workspace file-change events to the sessions whose patterns match.
///
/// Each session subscribes under its id and receives only events matching its
/// own pattern set; after `unsubscribe` no further events are delivered to
/// that session. The filesystem backend is optional so tests can inject
/// events directly through [`WatchRouter::dispatch`].
#[derive(Default)]
pub struct WatchRouter {
    subscriptions: Arc<RwLock<HashMap<String, Subscription>>>,
    backend: Mutex<Option<RecommendedWatcher>>,
}

impl WatchRouter {
    /// Create a router with no filesystem backend attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a session to events matching its pattern set
    pub fn subscribe(
        &self,
        session_id: &str,
        patterns: &WatchPatternSet,
    ) -> mpsc::UnboundedReceiver<PathBuf> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions
            .write()
            .expect("watch router lock poisoned")
            .insert(
                session_id.to_string(),
                Subscription {
                    matcher: patterns.matcher.clone(),
                    tx,
                },
            );
        debug!(session = %session_id, patterns = ?patterns.patterns(), "registered watch subscription");
        rx
    }

    /// Remove a session's subscription; no events are delivered afterwards
    pub fn unsubscribe(&self, session_id: &str) {
        if self
            .subscriptions
            .write()
            .expect("watch router lock poisoned")
            .remove(session_id)
            .is_some()
        {
            debug!(session = %session_id, "removed watch subscription");
        }
    }

    /// Deliver one change event to every matching subscription
    pub fn dispatch(&self, path: &Path) {
        dispatch_to(&self.subscriptions, path);
    }

    /// Attach the filesystem backend and watch a workspace folder recursively
    pub fn watch(&self, root: &Path) -> Result<()> {
        let mut backend = self.backend.lock().expect("watch backend lock poisoned");

        if backend.is_none() {
            let subscriptions = self.subscriptions.clone();
            let watcher = RecommendedWatcher::new(
                move |result: notify::Result<notify::Event>| match result {
                    Ok(event) => {
                        for path in &event.paths {
                            dispatch_to(&subscriptions, path);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "file watcher backend error");
                    }
                },
                notify::Config::default(),
            )
            .map_err(|e| ClientError::Watcher(e.to_string()))?;
            *backend = Some(watcher);
        }

        backend
            .as_mut()
            .expect("backend just initialized")
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| ClientError::Watcher(e.to_string()))?;

        debug!(root = %root.display(), "watching workspace folder");
        Ok(())
    }
}

fn dispatch_to(subscriptions: &RwLock<HashMap<String, Subscription>>, path: &Path) {
    let subscriptions = subscriptions.read().expect("watch router lock poisoned");
    for (session_id, subscription) in subscriptions.iter() {
        if subscription.matcher.is_match(path) {
            debug!(session = %session_id, path = %path.display(), "forwarding file change");
            // A closed receiver means the session is tearing down; drop the event
            let _ = subscription.tx.send(path.to_path_buf());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pattern_set_rejected() {
        let err = WatchPatternSet::new(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_pattern_set_matches_at_any_depth() {
        let patterns = WatchPatternSet::new(["**/.solidhunter.json"]).unwrap();
        assert!(patterns.matches(Path::new("/ws/.solidhunter.json")));
        assert!(patterns.matches(Path::new("/ws/contracts/.solidhunter.json")));
        assert!(!patterns.matches(Path::new("/ws/foundry.toml")));
    }

    #[test]
    fn test_dispatch_is_scoped_per_subscription() {
        let router = WatchRouter::new();
        let core = WatchPatternSet::new(["**/.solidhunter.json"]).unwrap();
        let foundry = WatchPatternSet::new(["**/foundry.toml"]).unwrap();

        let mut core_rx = router.subscribe("core", &core);
        let mut foundry_rx = router.subscribe("foundry", &foundry);

        router.dispatch(Path::new("/ws/foundry.toml"));
        router.dispatch(Path::new("/ws/src/.solidhunter.json"));
        router.dispatch(Path::new("/ws/src/Token.sol"));

        assert_eq!(core_rx.try_recv().unwrap(), PathBuf::from("/ws/src/.solidhunter.json"));
        assert!(core_rx.try_recv().is_err());

        assert_eq!(foundry_rx.try_recv().unwrap(), PathBuf::from("/ws/foundry.toml"));
        assert!(foundry_rx.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let router = WatchRouter::new();
        let patterns = WatchPatternSet::new(["**/foundry.toml"]).unwrap();
        let mut rx = router.subscribe("foundry", &patterns);

        router.unsubscribe("foundry");
        router.dispatch(Path::new("/ws/foundry.toml"));

        assert!(rx.try_recv().is_err());
    }
}
