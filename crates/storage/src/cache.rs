//! URL-keyed response cache on top of a [`StorageBackend`].

use crate::BackendHandle;
use crate::error::{ErrorKind, Result};
use crate::path::{from_url, validate as validate_path};
use futures::TryStreamExt;
use std::path::PathBuf;
use tracing::{debug, trace};
use url::Url;

/// Cache of fetched resources, one file per URL, under a namespace directory
/// of a storage backend.
///
/// Several caches can share one backend with different namespaces (e.g. sprite
/// images and the offline page shell). Entries never expire on their own:
/// sprite images at a given URL are immutable.
///
/// # Examples
///
/// ```
/// use dexsprite_storage::{ResourceCache, backend::LocalBackend};
/// use std::sync::Arc;
/// use url::Url;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let dir = tempfile::tempdir()?;
/// let backend = LocalBackend::new("cache", dir.path()).unwrap();
/// let images = ResourceCache::new(Arc::new(backend), "images").unwrap();
/// let url = Url::parse("https://cdn.example/sprites/25a.png")?;
/// assert!(images.get(&url).await.unwrap().is_none());
/// images.put(&url, b"PNG").await.unwrap();
/// assert_eq!(images.get(&url).await.unwrap().as_deref(), Some(&b"PNG"[..]));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ResourceCache {
    backend: BackendHandle,
    namespace: PathBuf,
}
impl ResourceCache {
    pub fn new(backend: BackendHandle, namespace: impl Into<PathBuf>) -> Result<Self> {
        let namespace = validate_path(namespace.into())?;
        Ok(Self { backend, namespace })
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    pub fn namespace(&self) -> &std::path::Path {
        &self.namespace
    }

    /// Storage path of `url` within the backend.
    pub fn path_for(&self, url: &Url) -> Result<PathBuf> {
        Ok(self.namespace.join(from_url(url)?))
    }

    pub async fn contains(&self, url: &Url) -> Result<bool> {
        self.backend.exists(&self.path_for(url)?).await
    }

    /// Cached body for `url`, or `None` when nothing is stored.
    pub async fn get(&self, url: &Url) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(url)?;
        match self.backend.read(&path).await {
            Ok(data) => {
                trace!(%url, backend = self.backend.name(), "Resource cache hit");
                Ok(Some(data))
            },
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn put(&self, url: &Url, data: &[u8]) -> Result<()> {
        let path = self.path_for(url)?;
        self.backend.write(&path, data).await?;
        trace!(%url, bytes = data.len(), "Resource cached");
        Ok(())
    }

    /// Number of cached resources.
    pub async fn len(&self) -> Result<usize> {
        self.backend.list_stream(Some(self.namespace.as_path())).try_fold(0, |n, _| async move { Ok(n + 1) }).await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Delete every resource in this namespace. Returns how many were removed.
    pub async fn clear(&self) -> Result<usize> {
        let files = self.backend.list(Some(self.namespace.as_path())).await?;
        let mut removed = 0;
        for file in files {
            match self.backend.delete(&file.path).await {
                Ok(()) => removed += 1,
                // Raced with another delete.
                Err(e) if matches!(&*e, ErrorKind::NotFound(_)) => {},
                Err(e) => return Err(e),
            }
        }
        debug!(namespace = %self.namespace.display(), removed, "Resource cache cleared");
        Ok(removed)
    }
}
