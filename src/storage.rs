use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use thiserror::Error;

/// A JSON document that lives in its own Sled tree, keyed by id.
pub trait Record: Serialize + DeserializeOwned {
    /// Tree name (one tree per collection).
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("corrupt document: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Document store over Sled. Records are Serde-serialized JSON, so the
/// schema is whatever the record struct says; no migrations.
#[derive(Clone)] // Sled handles are cheap to clone and thread-safe
pub struct Storage {
    db: Db,
}

impl Storage {
    /// Open or create the Sled database at the given path
    pub fn open(path: &str) -> StorageResult<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Throwaway in-memory-ish database, removed on drop. Used by tests.
    pub fn temporary() -> StorageResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn tree<T: Record>(&self) -> StorageResult<Tree> {
        Ok(self.db.open_tree(T::COLLECTION)?)
    }

    /// Insert or replace a record by id.
    pub fn save<T: Record>(&self, record: &T) -> StorageResult<()> {
        let json_bytes = serde_json::to_vec(record)?;
        self.tree::<T>()?.insert(record.id().as_bytes(), json_bytes)?;
        Ok(())
    }

    pub fn get<T: Record>(&self, id: &str) -> StorageResult<Option<T>> {
        match self.tree::<T>()?.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every record of the collection, in key order.
    pub fn all<T: Record>(&self) -> StorageResult<Vec<T>> {
        let mut records = vec![];
        for item in self.tree::<T>()?.iter() {
            let (_, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    /// First record matching the predicate (full scan).
    pub fn find<T: Record>(&self, predicate: impl Fn(&T) -> bool) -> StorageResult<Option<T>> {
        for item in self.tree::<T>()?.iter() {
            let (_, value) = item?;
            let record: T = serde_json::from_slice(&value)?;
            if predicate(&record) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    pub fn count<T: Record>(&self, predicate: impl Fn(&T) -> bool) -> StorageResult<usize> {
        Ok(self.all::<T>()?.into_iter().filter(|r| predicate(r)).count())
    }

    /// Remove by id. Returns whether a record was there.
    pub fn remove<T: Record>(&self, id: &str) -> StorageResult<bool> {
        Ok(self.tree::<T>()?.remove(id.as_bytes())?.is_some())
    }

    /// Drop every record of the collection.
    pub fn clear<T: Record>(&self) -> StorageResult<()> {
        self.tree::<T>()?.clear()?;
        Ok(())
    }

    pub async fn flush(&self) -> StorageResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

/// Fresh record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
