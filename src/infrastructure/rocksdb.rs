use crate::domain::ports::SessionStorage;
use crate::error::StoreError;
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;

/// Column Family holding serialized session records.
pub const CF_SESSIONS: &str = "sessions";

/// Durable tier backed by RocksDB.
///
/// Keys and values are stored as UTF-8 bytes in the `sessions` column family.
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbSessionStorage {
    db: Arc<DB>,
}

impl RocksDbSessionStorage {
    /// Opens or creates a RocksDB instance at `path` with the sessions column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_sessions = ColumnFamilyDescriptor::new(CF_SESSIONS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_sessions]).map_err(internal)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(CF_SESSIONS)
            .ok_or_else(|| internal("Sessions column family not found"))
    }
}

fn internal<E: ToString>(e: E) -> StoreError {
    StoreError::Internal(Box::new(std::io::Error::other(e.to_string())))
}

#[async_trait]
impl SessionStorage for RocksDbSessionStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let cf = self.cf()?;
        match self.db.get_cf(cf, key.as_bytes()).map_err(internal)? {
            // Undecodable bytes surface as a malformed record upstream.
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let cf = self.cf()?;
        self.db
            .put_cf(cf, key.as_bytes(), value.as_bytes())
            .map_err(internal)
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let cf = self.cf()?;
        self.db.delete_cf(cf, key.as_bytes()).map_err(internal)
    }
}
