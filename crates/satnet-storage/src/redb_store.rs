//! Durable bundle store on redb
//!
//! Each record is a postcard-encoded [`RecordRow`] holding the bundle in its
//! wire encoding. Every mutating operation runs in a single redb write
//! transaction, so eviction (select victim, remove, insert) commits or
//! aborts as a unit and a crash never leaves a partial record behind.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use satnet_core::{Bundle, BundleId, Priority, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace};

use crate::error::{StoreError, StoreResult};
use crate::eviction::{EvictionCandidate, select_victim};
use crate::record::{BundleFilter, BundleStatus, PutOutcome, StatusCounts, StoredBundleRecord};
use crate::{BundleStore, DEFAULT_CAPACITY};

// Key: bundle id bytes, Value: postcard RecordRow
const BUNDLES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("bundles");

// Key: counter name, Value: counter value
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_SEQUENCE: &str = "next_sequence";

/// Configuration for the redb bundle store
#[derive(Debug, Clone)]
pub struct RedbStoreConfig {
    /// Path to the database file
    pub db_path: PathBuf,
    /// Maximum number of records
    pub capacity: usize,
}

impl Default for RedbStoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/satnet.redb"),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl RedbStoreConfig {
    /// Store at a specific path with the default capacity
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    /// Set the capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

/// On-disk form of a record
///
/// Priority and status are duplicated outside the bundle bytes so eviction
/// and counting can run without decoding every bundle.
#[derive(Debug, Serialize, Deserialize)]
struct RecordRow {
    status: BundleStatus,
    priority: Priority,
    stored_at_ms: i64,
    sequence: u64,
    expires_at_ms: Option<i64>,
    bundle: Vec<u8>,
}

impl RecordRow {
    fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        postcard::from_bytes(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn stored_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.stored_at_ms).unwrap_or_default()
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at_ms
            .is_some_and(|deadline| now.timestamp_millis() > deadline)
    }

    fn candidate(&self, id: BundleId) -> EvictionCandidate {
        EvictionCandidate {
            id,
            priority: self.priority,
            status: self.status,
            stored_at: self.stored_at(),
            sequence: self.sequence,
        }
    }

    fn into_record(self) -> StoreResult<StoredBundleRecord> {
        let stored_at = self.stored_at();
        let bundle = decode(&self.bundle)?;
        Ok(StoredBundleRecord {
            bundle,
            status: self.status,
            stored_at,
            sequence: self.sequence,
        })
    }
}

fn id_from_key(key: &[u8]) -> StoreResult<BundleId> {
    let bytes: [u8; 16] = key
        .try_into()
        .map_err(|_| StoreError::Database(format!("bad key length {}", key.len())))?;
    Ok(BundleId::from_bytes(bytes))
}

/// Durable implementation of [`BundleStore`]
pub struct RedbBundleStore {
    db: Arc<Database>,
    config: RedbStoreConfig,
}

impl RedbBundleStore {
    /// Open or create the database
    #[instrument(skip(config), fields(path = %config.db_path.display()))]
    pub fn open(config: RedbStoreConfig) -> StoreResult<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&config.db_path).map_err(StoreError::database)?;
        info!(capacity = config.capacity, "Opened bundle database");

        let store = Self {
            db: Arc::new(db),
            config: RedbStoreConfig {
                capacity: config.capacity.max(1),
                ..config
            },
        };
        store.init_tables()?;
        Ok(store)
    }

    /// Get the configuration
    pub fn config(&self) -> &RedbStoreConfig {
        &self.config
    }

    fn init_tables(&self) -> StoreResult<()> {
        let write_txn = self.db.begin_write().map_err(StoreError::database)?;
        write_txn.open_table(BUNDLES).map_err(StoreError::database)?;
        write_txn.open_table(META).map_err(StoreError::database)?;
        write_txn.commit().map_err(StoreError::database)?;

        debug!("Initialized bundle tables");
        Ok(())
    }

    /// Read every row, decoding only the row envelope
    fn scan_rows(&self) -> StoreResult<Vec<(BundleId, RecordRow)>> {
        let read_txn = self.db.begin_read().map_err(StoreError::database)?;
        let table = read_txn.open_table(BUNDLES).map_err(StoreError::database)?;

        let mut rows = Vec::new();
        for entry in table.iter().map_err(StoreError::database)? {
            let (key, value) = entry.map_err(StoreError::database)?;
            rows.push((id_from_key(key.value())?, RecordRow::from_bytes(value.value())?));
        }
        Ok(rows)
    }

    /// Remove every row matching `predicate` in one transaction
    fn remove_where<F>(&self, predicate: F) -> StoreResult<usize>
    where
        F: Fn(&RecordRow) -> bool,
    {
        let write_txn = self.db.begin_write().map_err(StoreError::database)?;
        let removed = {
            let mut table = write_txn.open_table(BUNDLES).map_err(StoreError::database)?;

            let mut doomed = Vec::new();
            for entry in table.iter().map_err(StoreError::database)? {
                let (key, value) = entry.map_err(StoreError::database)?;
                if predicate(&RecordRow::from_bytes(value.value())?) {
                    doomed.push(key.value().to_vec());
                }
            }
            for key in &doomed {
                table.remove(key.as_slice()).map_err(StoreError::database)?;
            }
            doomed.len()
        };
        write_txn.commit().map_err(StoreError::database)?;
        Ok(removed)
    }
}

#[async_trait]
impl BundleStore for RedbBundleStore {
    fn capacity(&self) -> usize {
        self.config.capacity
    }

    async fn put(&self, bundle: Bundle, now: DateTime<Utc>) -> StoreResult<PutOutcome> {
        if bundle.is_expired(now) {
            return Err(StoreError::AlreadyExpired(bundle.id));
        }

        let key = *bundle.id.as_bytes();
        let write_txn = self.db.begin_write().map_err(StoreError::database)?;
        let outcome = {
            let mut table = write_txn.open_table(BUNDLES).map_err(StoreError::database)?;
            let mut meta = write_txn.open_table(META).map_err(StoreError::database)?;

            let exists = table
                .get(key.as_slice())
                .map_err(StoreError::database)?
                .is_some();
            if exists {
                trace!(bundle_id = %bundle.id, "Bundle already stored");
                return Ok(PutOutcome::AlreadyStored);
            }

            let mut evicted = None;
            let len = table.len().map_err(StoreError::database)?;
            if len >= self.config.capacity as u64 {
                let mut candidates = Vec::with_capacity(len as usize);
                for entry in table.iter().map_err(StoreError::database)? {
                    let (k, v) = entry.map_err(StoreError::database)?;
                    let id = id_from_key(k.value())?;
                    candidates.push(RecordRow::from_bytes(v.value())?.candidate(id));
                }

                let victim = select_victim(candidates, bundle.priority).ok_or(
                    StoreError::StoreFull {
                        capacity: self.config.capacity,
                    },
                )?;
                table
                    .remove(victim.as_bytes().as_slice())
                    .map_err(StoreError::database)?;
                debug!(victim = %victim, incoming = %bundle.id, "Evicted bundle to make room");
                evicted = Some(victim);
            }

            let sequence = meta
                .get(NEXT_SEQUENCE)
                .map_err(StoreError::database)?
                .map(|v| v.value())
                .unwrap_or(0);
            meta.insert(NEXT_SEQUENCE, sequence + 1)
                .map_err(StoreError::database)?;

            let row = RecordRow {
                status: BundleStatus::Pending,
                priority: bundle.priority,
                stored_at_ms: now.timestamp_millis(),
                sequence,
                expires_at_ms: bundle.expires_at().map(|t| t.timestamp_millis()),
                bundle: encode(&bundle)?.to_vec(),
            };
            table
                .insert(key.as_slice(), row.to_bytes()?.as_slice())
                .map_err(StoreError::database)?;

            match evicted {
                Some(evicted) => PutOutcome::StoredAfterEviction { evicted },
                None => PutOutcome::Stored,
            }
        };
        write_txn.commit().map_err(StoreError::database)?;
        Ok(outcome)
    }

    async fn get(&self, id: &BundleId) -> StoreResult<StoredBundleRecord> {
        let read_txn = self.db.begin_read().map_err(StoreError::database)?;
        let table = read_txn.open_table(BUNDLES).map_err(StoreError::database)?;

        let bytes = table
            .get(id.as_bytes().as_slice())
            .map_err(StoreError::database)?
            .map(|v| v.value().to_vec())
            .ok_or(StoreError::NotFound(*id))?;
        RecordRow::from_bytes(&bytes)?.into_record()
    }

    async fn delete(&self, id: &BundleId) -> StoreResult<()> {
        let write_txn = self.db.begin_write().map_err(StoreError::database)?;
        {
            let mut table = write_txn.open_table(BUNDLES).map_err(StoreError::database)?;
            table
                .remove(id.as_bytes().as_slice())
                .map_err(StoreError::database)?;
        }
        write_txn.commit().map_err(StoreError::database)?;
        Ok(())
    }

    async fn list(&self, filter: &BundleFilter) -> StoreResult<Vec<StoredBundleRecord>> {
        let mut records = Vec::new();
        for (_, row) in self.scan_rows()? {
            if filter.status.is_some_and(|s| s != row.status)
                || filter.min_priority.is_some_and(|p| row.priority < p)
            {
                continue;
            }
            let record = row.into_record()?;
            if filter.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn count(&self) -> StoreResult<usize> {
        let read_txn = self.db.begin_read().map_err(StoreError::database)?;
        let table = read_txn.open_table(BUNDLES).map_err(StoreError::database)?;
        Ok(table.len().map_err(StoreError::database)? as usize)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        self.remove_where(|row| row.is_expired(now))
    }

    async fn update_status(&self, id: &BundleId, status: BundleStatus) -> StoreResult<()> {
        let write_txn = self.db.begin_write().map_err(StoreError::database)?;
        {
            let mut table = write_txn.open_table(BUNDLES).map_err(StoreError::database)?;
            let bytes = table
                .get(id.as_bytes().as_slice())
                .map_err(StoreError::database)?
                .map(|v| v.value().to_vec())
                .ok_or(StoreError::NotFound(*id))?;

            let mut row = RecordRow::from_bytes(&bytes)?;
            if !row.status.can_transition_to(status) {
                return Err(StoreError::InvalidTransition {
                    id: *id,
                    from: row.status,
                    to: status,
                });
            }
            row.status = status;
            table
                .insert(id.as_bytes().as_slice(), row.to_bytes()?.as_slice())
                .map_err(StoreError::database)?;
        }
        write_txn.commit().map_err(StoreError::database)?;
        Ok(())
    }

    async fn status_counts(&self) -> StoreResult<StatusCounts> {
        let mut counts = StatusCounts::default();
        for (_, row) in self.scan_rows()? {
            counts.record(row.status);
        }
        Ok(counts)
    }

    async fn purge_terminal(&self, older_than: DateTime<Utc>) -> StoreResult<usize> {
        self.remove_where(|row| row.status.is_terminal() && row.stored_at() < older_than)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    fn open_store(dir: &TempDir, capacity: usize) -> RedbBundleStore {
        RedbBundleStore::open(
            RedbStoreConfig::at(dir.path().join("bundles.redb")).with_capacity(capacity),
        )
        .unwrap()
    }

    fn bundle() -> Bundle {
        Bundle::new(
            "dtn://earth",
            "dtn://mars/rover",
            b"science data".to_vec(),
            Priority::Normal,
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let b = bundle();
        let id = b.id;

        {
            let store = open_store(&dir, 10);
            store.put(b.clone(), Utc::now()).await.unwrap();
            store
                .update_status(&id, BundleStatus::InTransit)
                .await
                .unwrap();
        }

        let store = open_store(&dir, 10);
        let record = store.get(&id).await.unwrap();
        assert_eq!(record.bundle, b);
        assert_eq!(record.status, BundleStatus::InTransit);
    }

    #[tokio::test]
    async fn test_sequence_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let first = bundle();
        let second = bundle();

        {
            let store = open_store(&dir, 10);
            store.put(first.clone(), Utc::now()).await.unwrap();
        }
        let store = open_store(&dir, 10);
        store.put(second.clone(), Utc::now()).await.unwrap();

        let a = store.get(&first.id).await.unwrap();
        let b = store.get(&second.id).await.unwrap();
        assert!(b.sequence > a.sequence);
    }

    #[tokio::test]
    async fn test_failed_update_leaves_record_untouched() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 10);
        let b = bundle();
        let id = b.id;

        store.put(b, Utc::now()).await.unwrap();
        store
            .update_status(&id, BundleStatus::Delivered)
            .await
            .unwrap();
        assert!(
            store
                .update_status(&id, BundleStatus::Pending)
                .await
                .is_err()
        );
        assert_eq!(
            store.get(&id).await.unwrap().status,
            BundleStatus::Delivered
        );
    }
}
