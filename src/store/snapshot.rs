use crate::models::ListingRecord;
use crate::store::{write_atomic, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotFile {
    updated_at: Option<DateTime<Utc>>,
    records: Vec<ListingRecord>,
}

/// Tabular export of every listing seen, with its processed flag
#[derive(Debug)]
pub struct Snapshot {
    path: PathBuf,
    updated_at: Option<DateTime<Utc>>,
    records: Vec<ListingRecord>,
    index: HashMap<String, usize>,
}

impl Snapshot {
    /// Load the snapshot; a missing or corrupt file starts empty
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::try_load(&path).await {
            Ok(snapshot) => {
                info!(
                    "Loaded snapshot with {} records from {}",
                    snapshot.records.len(),
                    path.display()
                );
                snapshot
            }
            Err(e) => {
                warn!("Failed to load snapshot, starting empty: {}", e);
                Self::from_records(path, None, Vec::new())
            }
        }
    }

    pub async fn try_load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No snapshot at {}", path.display());
                return Ok(Self::from_records(path.to_path_buf(), None, Vec::new()));
            }
            Err(e) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let file: SnapshotFile =
            serde_json::from_str(&contents).map_err(|e| StoreError::Json {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(Self::from_records(
            path.to_path_buf(),
            file.updated_at,
            file.records,
        ))
    }

    fn from_records(
        path: PathBuf,
        updated_at: Option<DateTime<Utc>>,
        records: Vec<ListingRecord>,
    ) -> Self {
        let mut snapshot = Self {
            path,
            updated_at,
            records: Vec::new(),
            index: HashMap::new(),
        };
        snapshot.merge(records);
        snapshot
    }

    pub fn records(&self) -> &[ListingRecord] {
        &self.records
    }

    #[cfg(test)]
    pub fn get(&self, address: &str) -> Option<&ListingRecord> {
        self.index.get(address).map(|&i| &self.records[i])
    }

    pub fn processed_count(&self) -> usize {
        self.records.iter().filter(|r| r.processed).count()
    }

    /// Fold records in by address
    ///
    /// Scalar fields take the latest values; `processed` is sticky.
    pub fn merge(&mut self, records: impl IntoIterator<Item = ListingRecord>) {
        for record in records {
            match self.index.get(&record.address) {
                Some(&i) => {
                    let existing = &mut self.records[i];
                    let processed = existing.processed || record.processed;
                    *existing = record;
                    existing.processed = processed;
                }
                None => {
                    self.index.insert(record.address.clone(), self.records.len());
                    self.records.push(record);
                }
            }
        }
    }

    pub async fn save(&mut self) -> Result<(), StoreError> {
        self.updated_at = Some(Utc::now());
        let file = SnapshotFile {
            updated_at: self.updated_at,
            records: self.records.clone(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| StoreError::Json {
            path: self.path.clone(),
            source: e,
        })?;
        write_atomic(&self.path, json.as_bytes()).await?;
        debug!("Saved {} records to {}", self.records.len(), self.path.display());
        Ok(())
    }
}
