// Segment storage capability and the directory-backed default.

use crate::error::HlsError;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, trace};

/// Persists downloaded segments and deletes evicted ones.
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Writes `data` under `name` and returns where it landed.
    async fn store(&self, name: &str, data: Bytes) -> Result<PathBuf, HlsError>;

    async fn remove(&self, path: &Path) -> Result<(), HlsError>;
}

/// Local file name for a segment: the sequence number followed by the last
/// path component of its URI, so equal names from different sequences do not
/// collide.
pub fn segment_file_name(sequence: u64, uri: &str) -> String {
    let without_query = uri.split(['?', '#']).next().unwrap_or_default();
    let base = without_query
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or("segment.ts");
    format!("{sequence:08}-{base}")
}

#[derive(Debug)]
enum Root {
    Dir(PathBuf),
    Temp(TempDir),
}

/// Writes segments into a directory, either a given one or a temporary one
/// that is deleted with the store.
#[derive(Debug)]
pub struct DirectoryStore {
    root: Root,
}

impl DirectoryStore {
    pub async fn in_dir(path: impl Into<PathBuf>) -> Result<Self, HlsError> {
        let path = path.into();
        tokio::fs::create_dir_all(&path).await?;
        debug!(path = %path.display(), "Using segment directory");
        Ok(Self {
            root: Root::Dir(path),
        })
    }

    pub fn temporary() -> Result<Self, HlsError> {
        let dir = tempfile::Builder::new().prefix("hls-segments-").tempdir()?;
        debug!(path = %dir.path().display(), "Using temporary segment directory");
        Ok(Self {
            root: Root::Temp(dir),
        })
    }

    /// [`in_dir`](Self::in_dir) when `path` is set, else [`temporary`](Self::temporary).
    pub async fn from_config(path: Option<&Path>) -> Result<Self, HlsError> {
        match path {
            Some(path) => Self::in_dir(path).await,
            None => Self::temporary(),
        }
    }

    pub fn path(&self) -> &Path {
        match &self.root {
            Root::Dir(path) => path,
            Root::Temp(dir) => dir.path(),
        }
    }
}

#[async_trait]
impl SegmentStore for DirectoryStore {
    async fn store(&self, name: &str, data: Bytes) -> Result<PathBuf, HlsError> {
        let path = self.path().join(name);
        tokio::fs::write(&path, &data).await?;
        trace!(path = %path.display(), bytes = data.len(), "Stored segment");
        Ok(path)
    }

    async fn remove(&self, path: &Path) -> Result<(), HlsError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
