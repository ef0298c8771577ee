use redb::{Database, ReadableTable, TableDefinition};
use rkyv::{AlignedVec, Archive, Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::url_utils::UrlKey;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("Database creation error: {0}")]
    RedbCreate(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),
}

/// Durable value for one frontier key: the URL as discovered and whether it was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[archive(check_bytes)]
pub struct FrontierRecord {
    pub url: String,
    pub completed: bool,
}

impl FrontierRecord {
    pub fn pending(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            completed: false,
        }
    }

    pub fn completed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            completed: true,
        }
    }

    fn to_bytes(&self) -> Result<AlignedVec, StateError> {
        rkyv::to_bytes::<_, 256>(self)
            .map_err(|e| StateError::Serialization(format!("Serialize failed: {:?}", e)))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, StateError> {
        // redb hands out unaligned slices; copy before validating the archive.
        let mut aligned = AlignedVec::new();
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<FrontierRecord>(&aligned)
            .map_err(|e| StateError::Serialization(format!("Deserialize failed: {:?}", e)))
    }
}

/// Durable `url_key -> (url, completed)` map backed by redb.
///
/// Every upsert is its own committed write transaction, so a crash loses no
/// frontier mutation that returned successfully.
pub struct FrontierStore {
    db: Arc<Database>,
}

impl FrontierStore {
    const RECORDS: TableDefinition<'static, &'static str, &'static [u8]> =
        TableDefinition::new("frontier");

    pub const FILE_NAME: &'static str = "frontier.redb";

    /// Open (or create) `frontier.redb` inside `data_dir`.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, StateError> {
        let data_path = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_path)?;

        let db = Database::create(data_path.join(Self::FILE_NAME))?;

        // Create the table up front so read transactions never hit a missing table.
        let write_txn = db.begin_write()?;
        {
            let _records = write_txn.open_table(Self::RECORDS)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    pub fn exists<P: AsRef<Path>>(data_dir: P) -> bool {
        data_dir.as_ref().join(Self::FILE_NAME).exists()
    }

    pub fn remove<P: AsRef<Path>>(data_dir: P) -> Result<(), StateError> {
        let path = data_dir.as_ref().join(Self::FILE_NAME);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn upsert(&self, key: &UrlKey, record: &FrontierRecord) -> Result<(), StateError> {
        let bytes = record.to_bytes()?;
        let hex = key.to_hex();

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(Self::RECORDS)?;
            table.insert(hex.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, key: &UrlKey) -> Result<Option<FrontierRecord>, StateError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(Self::RECORDS)?;
        let hex = key.to_hex();
        let record = match table.get(hex.as_str())? {
            Some(bytes) => Some(FrontierRecord::from_bytes(bytes.value())?),
            None => None,
        };
        Ok(record)
    }

    pub fn contains(&self, key: &UrlKey) -> Result<bool, StateError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(Self::RECORDS)?;
        let found = table.get(key.to_hex().as_str())?.is_some();
        Ok(found)
    }

    /// Visit every record. Used once at startup to rebuild the in-memory frontier.
    pub fn for_each<F>(&self, mut f: F) -> Result<(), StateError>
    where
        F: FnMut(FrontierRecord) -> Result<(), StateError>,
    {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(Self::RECORDS)?;

        for result in table.iter()? {
            let (_key, value) = result?;
            f(FrontierRecord::from_bytes(value.value())?)?;
        }

        Ok(())
    }

    pub fn len(&self) -> Result<usize, StateError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(Self::RECORDS)?;
        let count = table.iter()?.count();
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool, StateError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(Self::RECORDS)?;
        let empty = table.iter()?.next().is_none();
        Ok(empty)
    }
}
