//! [`Filesystem`] backed by the host filesystem through `tokio::fs`.

use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::contract::Filesystem;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

#[async_trait]
impl Filesystem for LocalFilesystem {
    async fn list_directory(&self, path: &Path) -> std::io::Result<Vec<OsString>> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name());
        }
        debug!(path = %path.display(), entries = names.len(), "Listed directory");
        Ok(names)
    }

    async fn read_file(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn lists_and_reads_real_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("1.png"), b"png-bytes").unwrap();
        std::fs::create_dir(dir.path().join("cell")).unwrap();

        let fs = LocalFilesystem;
        let mut names = fs.list_directory(dir.path()).await.unwrap();
        names.sort();
        assert_eq!(names, vec![OsString::from("1.png"), OsString::from("cell")]);

        let bytes = fs.read_file(&dir.path().join("1.png")).await.unwrap();
        assert_eq!(bytes, b"png-bytes");
    }

    #[tokio::test]
    async fn listing_a_file_is_an_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        assert!(LocalFilesystem.list_directory(&file).await.is_err());
    }
}
