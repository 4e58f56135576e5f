//! Per-run table of downloaded packages, keyed by URL.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// URL → local path of every package downloaded during a run.
///
/// Owned by the [`Coordinator`](crate::Coordinator) and shared by clone. The
/// lock is never held across an await.
#[derive(Debug, Clone, Default)]
pub struct DownloadTable {
    entries: Arc<Mutex<HashMap<String, PathBuf>>>,
}

impl DownloadTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PathBuf>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Record a download. The first path recorded for a URL is kept.
    ///
    /// Returns the path now associated with `url`.
    pub fn insert(&self, url: &str, path: PathBuf) -> PathBuf {
        self.lock().entry(url.to_string()).or_insert(path).clone()
    }

    pub fn get(&self, url: &str) -> Option<PathBuf> {
        self.lock().get(url).cloned()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.lock().contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget `urls`, once the workspace holding their files is deleted.
    pub fn release<'a>(&self, urls: impl IntoIterator<Item = &'a str>) {
        let mut entries = self.lock();
        for url in urls {
            entries.remove(url);
        }
    }
}
