//! Workspace file discovery and initial document opens

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ClientError, Result};

/// Discovery pattern for the domain language's sources
const SOURCE_GLOB: &str = "**/*.sol";

/// The host editor's document model, as seen by the orchestrator.
///
/// Opening a document is the signal that triggers analysis once a matching
/// session is live; the orchestrator never waits for analysis itself.
#[async_trait]
pub trait DocumentHost: Send + Sync {
    /// Ask the host to open a document for analysis
    async fn open_document(&self, uri: Url) -> Result<()>;
}

/// Enumerate the domain sources beneath a workspace folder, recursively.
///
/// Enumeration is completed before the caller issues any open requests; an
/// unreadable directory aborts the whole run. The folder prefix is escaped
/// so metacharacters in the folder's own path are matched literally.
pub fn discover_sources(folder: &Path) -> Result<Vec<PathBuf>> {
    let root = folder.to_str().ok_or_else(|| {
        ClientError::Discovery(format!(
            "workspace folder path is not valid UTF-8: {}",
            folder.display()
        ))
    })?;
    let pattern = format!("{}/{}", glob::Pattern::escape(root), SOURCE_GLOB);

    let entries = glob::glob(&pattern)
        .map_err(|e| ClientError::Discovery(format!("invalid discovery pattern: {}", e)))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ClientError::Discovery(e.to_string()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

/// Open every discovered source in the first workspace folder for analysis.
///
/// With no folders open this is a no-op. Only the first folder is scanned.
/// Open requests are issued to the host sequentially, in enumeration order;
/// an individual failure is logged and the rest proceed. Returns how many
/// open requests were issued.
pub async fn bootstrap(host: Arc<dyn DocumentHost>, folders: &[PathBuf]) -> Result<usize> {
    let Some(folder) = folders.first() else {
        debug!("no workspace folders open; skipping file discovery");
        return Ok(0);
    };

    let files = discover_sources(folder)?;
    info!(
        folder = %folder.display(),
        count = files.len(),
        "discovered workspace sources"
    );

    let mut issued = 0;
    for path in files {
        let Ok(uri) = Url::from_file_path(&path) else {
            warn!(path = %path.display(), "skipping source with non-absolute path");
            continue;
        };
        issued += 1;
        if let Err(e) = host.open_document(uri.clone()).await {
            warn!(uri = %uri, error = %e, "failed to open document for analysis");
        }
    }

    Ok(issued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHost {
        opened: Mutex<Vec<Url>>,
    }

    impl RecordingHost {
        fn opened(&self) -> Vec<Url> {
            self.opened.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DocumentHost for RecordingHost {
        async fn open_document(&self, uri: Url) -> Result<()> {
            self.opened.lock().unwrap().push(uri);
            Ok(())
        }
    }

    /// Host that yields before recording, so any reordering of concurrently
    /// issued opens would surface in the recorded sequence
    #[derive(Default)]
    struct YieldingHost {
        opened: Mutex<Vec<Url>>,
    }

    #[async_trait]
    impl DocumentHost for YieldingHost {
        async fn open_document(&self, uri: Url) -> Result<()> {
            tokio::task::yield_now().await;
            self.opened.lock().unwrap().push(uri);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_bootstrap_without_folders_is_noop() {
        let host = Arc::new(RecordingHost::default());
        let issued = bootstrap(host.clone(), &[]).await.unwrap();
        assert_eq!(issued, 0);
        assert!(host.opened().is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_opens_only_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("contracts")).unwrap();
        std::fs::write(root.join("a.sol"), "contract A {}").unwrap();
        std::fs::write(root.join("contracts/b.sol"), "contract B {}").unwrap();
        std::fs::write(root.join("readme.md"), "docs").unwrap();
        std::fs::write(root.join("contracts/notes.txt"), "notes").unwrap();

        let host = Arc::new(RecordingHost::default());
        let issued = bootstrap(host.clone(), &[root.to_path_buf()]).await.unwrap();
        assert_eq!(issued, 2);

        let opened = host.opened();
        assert_eq!(opened.len(), 2);
        assert!(opened.iter().all(|uri| uri.path().ends_with(".sol")));
    }

    #[tokio::test]
    async fn test_bootstrap_scans_only_first_folder() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("a.sol"), "contract A {}").unwrap();
        std::fs::write(second.path().join("b.sol"), "contract B {}").unwrap();

        let host = Arc::new(RecordingHost::default());
        let folders = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let issued = bootstrap(host.clone(), &folders).await.unwrap();
        assert_eq!(issued, 1);
        assert!(host.opened()[0].path().ends_with("a.sol"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_opens_are_issued_in_enumeration_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for i in 0..200 {
            std::fs::write(root.join(format!("c{:03}.sol", i)), "").unwrap();
        }

        let host = Arc::new(YieldingHost::default());
        let issued = bootstrap(host.clone(), &[root.to_path_buf()]).await.unwrap();
        assert_eq!(issued, 200);

        let expected: Vec<Url> = discover_sources(root)
            .unwrap()
            .iter()
            .map(|p| Url::from_file_path(p).unwrap())
            .collect();
        assert_eq!(host.opened.lock().unwrap().clone(), expected);
    }

    #[test]
    fn test_discover_sources_is_recursive_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/deep")).unwrap();
        std::fs::write(root.join("src/deep/Token.sol"), "").unwrap();
        std::fs::write(root.join("Main.sol"), "").unwrap();
        std::fs::write(root.join("build.log"), "").unwrap();

        let files = discover_sources(root).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|p| p.ends_with("Main.sol")));
        assert!(files.iter().any(|p| p.ends_with("src/deep/Token.sol")));
    }

    #[test]
    fn test_discover_sources_in_folder_with_metacharacters() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("work [1]");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("Token.sol"), "").unwrap();
        std::fs::write(root.join("notes.txt"), "").unwrap();

        let files = discover_sources(&root).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("Token.sol"));
    }
}
