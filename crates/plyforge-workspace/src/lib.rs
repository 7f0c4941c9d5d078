//! Per-batch workspace management for the reconstruction pipeline.
//!
//! Every upload request receives its own directory under a shared root,
//! named by a freshly generated 128-bit random identifier so that no two
//! batches can ever collide on disk. The root is wiped wholesale when the
//! manager is initialised: batches are ephemeral by contract and none
//! survives a process restart.
#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

mod error;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

pub use error::{WorkspaceError, WorkspaceResult};

/// Subdirectory of a video batch holding extracted frames.
pub const FRAMES_DIR_NAME: &str = "frames";

/// Subdirectory of a video batch holding converted point clouds.
pub const OUTPUTS_DIR_NAME: &str = "plys";

/// File extension of produced point-cloud artifacts, without the dot.
pub const ARTIFACT_EXTENSION: &str = "ply";

/// One batch's identity and workspace directory.
#[derive(Debug, Clone)]
pub struct Batch {
    id: Uuid,
    dir: PathBuf,
}

impl Batch {
    /// Unique identifier of the batch.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Workspace directory owned by the batch.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory receiving extracted frames for a video batch.
    #[must_use]
    pub fn frames_dir(&self) -> PathBuf {
        self.dir.join(FRAMES_DIR_NAME)
    }

    /// Directory receiving converted artifacts for a video batch.
    #[must_use]
    pub fn outputs_dir(&self) -> PathBuf {
        self.dir.join(OUTPUTS_DIR_NAME)
    }
}

/// Allocates and resolves isolated per-batch workspaces under a shared root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Initialise the manager, discarding any batches left behind by a
    /// previous run.
    ///
    /// The root directory is removed wholesale and recreated. This is the
    /// explicit no-durability policy for batch workspaces, not a cleanup
    /// heuristic.
    ///
    /// # Errors
    ///
    /// Returns an error if the stale root cannot be removed or the fresh
    /// root cannot be created.
    pub fn init(root: impl Into<PathBuf>) -> WorkspaceResult<Self> {
        let root = root.into();
        if root.exists() {
            fs::remove_dir_all(&root)
                .map_err(|source| WorkspaceError::io("init.remove_root", &root, source))?;
            info!(root = %root.display(), "discarded batch workspaces from previous run");
        }
        fs::create_dir_all(&root)
            .map_err(|source| WorkspaceError::io("init.create_root", &root, source))?;
        Ok(Self { root })
    }

    /// Shared root directory under which all batch workspaces live.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a fresh batch with a unique identifier and an empty
    /// workspace directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace directory cannot be created
    /// (disk full, permissions).
    pub fn create_batch(&self) -> WorkspaceResult<Batch> {
        let id = Uuid::new_v4();
        let dir = self.root.join(id.to_string());
        fs::create_dir(&dir)
            .map_err(|source| WorkspaceError::io("create_batch.create_dir", &dir, source))?;
        debug!(batch_id = %id, dir = %dir.display(), "allocated batch workspace");
        Ok(Batch { id, dir })
    }

    /// Resolve an existing batch identifier to its workspace directory.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::BatchNotFound`] if no workspace exists for
    /// the identifier.
    pub fn resolve_batch(&self, batch_id: Uuid) -> WorkspaceResult<PathBuf> {
        let dir = self.root.join(batch_id.to_string());
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(WorkspaceError::BatchNotFound { batch_id })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn init_wipes_previous_batches() -> WorkspaceResult<()> {
        let temp = TempDir::new().expect("tempdir");
        let root = temp.path().join("batches");
        let stale = root.join("stale-batch");
        fs::create_dir_all(&stale).expect("stale dir");
        fs::write(stale.join("leftover.ply"), b"bytes").expect("stale file");

        let manager = WorkspaceManager::init(&root)?;
        assert!(manager.root().is_dir());
        assert!(!stale.exists(), "previous batches must be discarded");
        Ok(())
    }

    #[test]
    fn create_batch_allocates_directory_under_root() -> WorkspaceResult<()> {
        let temp = TempDir::new().expect("tempdir");
        let manager = WorkspaceManager::init(temp.path().join("batches"))?;
        let batch = manager.create_batch()?;

        assert!(batch.dir().is_dir());
        assert_eq!(batch.dir(), manager.root().join(batch.id().to_string()));
        assert_eq!(batch.frames_dir(), batch.dir().join(FRAMES_DIR_NAME));
        assert_eq!(batch.outputs_dir(), batch.dir().join(OUTPUTS_DIR_NAME));
        Ok(())
    }

    #[test]
    fn batch_ids_are_pairwise_distinct() -> WorkspaceResult<()> {
        let temp = TempDir::new().expect("tempdir");
        let manager = WorkspaceManager::init(temp.path().join("batches"))?;
        let mut seen = HashSet::new();
        for _ in 0..64 {
            assert!(seen.insert(manager.create_batch()?.id()));
        }
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_batch_creation_never_collides() {
        let temp = TempDir::new().expect("tempdir");
        let manager =
            Arc::new(WorkspaceManager::init(temp.path().join("batches")).expect("init manager"));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                manager.create_batch().expect("create batch").id()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            assert!(seen.insert(handle.await.expect("batch task panicked")));
        }
        assert_eq!(seen.len(), 32);
    }

    #[test]
    fn resolve_batch_round_trips_and_rejects_unknown_ids() -> WorkspaceResult<()> {
        let temp = TempDir::new().expect("tempdir");
        let manager = WorkspaceManager::init(temp.path().join("batches"))?;
        let batch = manager.create_batch()?;

        assert_eq!(manager.resolve_batch(batch.id())?, batch.dir());

        let unknown = Uuid::new_v4();
        assert!(matches!(
            manager.resolve_batch(unknown),
            Err(WorkspaceError::BatchNotFound { batch_id }) if batch_id == unknown
        ));
        Ok(())
    }
}
