//! Two-level directory enumeration: the root holds cells, cells hold shots.

use std::path::{Path, PathBuf};

use futures::future::try_join_all;
use tracing::{debug, error, info};

use crate::contract::Filesystem;
use crate::error::TraversalError;

/// Enumerates every shot of every cell under a root.
pub struct DirectoryWalker<'a, F: Filesystem + ?Sized> {
    fs: &'a F,
}

impl<'a, F: Filesystem + ?Sized> DirectoryWalker<'a, F> {
    pub fn new(fs: &'a F) -> Self {
        Self { fs }
    }

    /// Full paths of all shots under `root`, sorted by cell then shot name.
    ///
    /// Each call re-scans the tree. Only two levels are visited: whatever a
    /// cell contains is yielded as a shot, directories included, and fails
    /// later when it is read.
    pub async fn enumerate(&self, root: &Path) -> Result<Vec<PathBuf>, TraversalError> {
        let cells = self.list(root).await?;
        info!(root = %root.display(), cells = cells.len(), "Enumerated cells");

        let listings = try_join_all(cells.iter().map(|cell| async move {
            let shots = self.list(cell).await?;
            debug!(cell = %cell.display(), shots = shots.len(), "Enumerated shots");
            Ok::<_, TraversalError>(shots)
        }))
        .await?;

        Ok(listings.into_iter().flatten().collect())
    }

    async fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, TraversalError> {
        let mut names = self.fs.list_directory(dir).await.map_err(|source| {
            error!(path = %dir.display(), error = %source, "Failed to list directory");
            TraversalError {
                path: dir.to_path_buf(),
                source,
            }
        })?;
        names.sort();
        Ok(names.into_iter().map(|name| dir.join(name)).collect())
    }
}
