//! Persistent record of which listings have already been announced.
//!
//! The store is a flat file with one address per line. It is read once at
//! startup and appended to (with an fsync) every time a new address is
//! accepted, so a restart never re-announces a listing that was marked.

pub mod snapshot;

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

pub use snapshot::Snapshot;

/// Persistence failures for the dedup store and the snapshot
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed data in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Set of addresses that already triggered a notification
#[derive(Debug)]
pub struct DedupStore {
    path: PathBuf,
    known: HashSet<String>,
    /// Least recently seen first; used for retention
    order: VecDeque<String>,
    max_entries: Option<usize>,
    /// File ends without a line break (hand edited)
    needs_newline: bool,
}

impl DedupStore {
    /// Load the store, treating any read failure as an empty set
    pub async fn load(path: impl Into<PathBuf>, max_entries: Option<usize>) -> Self {
        let path = path.into();
        match Self::try_load(&path, max_entries).await {
            Ok(store) => {
                info!("Loaded {} known addresses from {}", store.len(), path.display());
                store
            }
            Err(e) => {
                warn!("Failed to load dedup store, starting empty: {}", e);
                Self::empty(path, max_entries)
            }
        }
    }

    /// Load the store; a missing file is an empty store
    pub async fn try_load(
        path: impl AsRef<Path>,
        max_entries: Option<usize>,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let mut store = Self::empty(path.to_path_buf(), max_entries);

        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No dedup store at {}, starting empty", path.display());
                return Ok(store);
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };

        store.needs_newline = !contents.is_empty() && !contents.ends_with('\n');
        for line in contents.lines() {
            let address = line.trim();
            if !address.is_empty() && store.known.insert(address.to_string()) {
                store.order.push_back(address.to_string());
            }
        }
        store.evict_overflow();

        Ok(store)
    }

    fn empty(path: PathBuf, max_entries: Option<usize>) -> Self {
        Self {
            path,
            known: HashSet::new(),
            order: VecDeque::new(),
            max_entries,
            needs_newline: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn is_known(&self, address: &str) -> bool {
        self.known.contains(&line_key(address))
    }

    /// Move a known address to the fresh end so retention keeps it
    ///
    /// Called for every address still on the page; eviction then only drops
    /// listings that have disappeared.
    pub fn touch(&mut self, address: &str) {
        if self.max_entries.is_none() {
            return;
        }
        let key = line_key(address);
        if let Some(pos) = self.order.iter().position(|a| *a == key) {
            if let Some(entry) = self.order.remove(pos) {
                self.order.push_back(entry);
            }
        }
    }

    /// Record an address and persist it before returning
    ///
    /// The in-memory set is updated even when the write fails, so the
    /// running process never re-announces the address.
    pub async fn mark_known(&mut self, address: &str) -> Result<(), StoreError> {
        let key = line_key(address);
        if !self.known.insert(key.clone()) {
            return Ok(());
        }
        self.order.push_back(key.clone());

        if self.evict_overflow() > 0 {
            self.rewrite().await
        } else {
            self.append(&key).await
        }
    }

    /// Drop the oldest entries beyond the retention cap
    fn evict_overflow(&mut self) -> usize {
        let Some(max) = self.max_entries else {
            return 0;
        };
        let mut evicted = 0;
        while self.order.len() > max {
            if let Some(old) = self.order.pop_front() {
                self.known.remove(&old);
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!("Evicted {} old addresses from dedup store", evicted);
        }
        evicted
    }

    async fn append(&mut self, key: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;

        let line = if self.needs_newline {
            format!("\n{}\n", key)
        } else {
            format!("{}\n", key)
        };
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.sync_all()
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        self.needs_newline = false;
        Ok(())
    }

    async fn rewrite(&mut self) -> Result<(), StoreError> {
        let mut contents = String::new();
        for address in &self.order {
            contents.push_str(address);
            contents.push('\n');
        }
        write_atomic(&self.path, contents.as_bytes()).await?;
        self.needs_newline = false;
        Ok(())
    }
}

/// Addresses are stored one per line, so line breaks cannot be part of a key
fn line_key(address: &str) -> String {
    address.trim().replace(['\r', '\n'], " ")
}

/// Write to a sibling temp file, fsync, then rename over the target
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = fs::File::create(&tmp)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.sync_all().await.map_err(|e| StoreError::io(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}

#[cfg(test)]
pub(crate) fn temp_path(name: &str) -> PathBuf {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir()
        .join(format!("daft-watch-{}-{}", std::process::id(), n))
        .join(name)
}
