pub mod audit;
pub mod db;
pub mod index;
pub mod json;
pub mod models;

pub use audit::{AuditLog, AuditSummary};
pub use db::SqliteStore;
pub use index::{AccountIndex, ImportReport};
pub use json::{JsonAuditStore, JsonIndexStore};
pub use models::{AuditAction, AuditEntry, TrackedAccountRecord};

use solana_sdk::pubkey::Pubkey;

use crate::{
    config::{StorageBackend, StorageConfig},
    error::Result,
};

/// Persistence for tracked account records.
pub trait IndexStore: Send {
    fn get(&self, address: &Pubkey) -> Result<Option<TrackedAccountRecord>>;

    fn list(&self) -> Result<Vec<TrackedAccountRecord>>;

    /// Atomic insert-if-absent. Returns false when the address already exists.
    fn insert_if_absent(&mut self, record: &TrackedAccountRecord) -> Result<bool>;

    /// Sets `last_checked_at`. Returns false when the address is not tracked.
    fn touch(&mut self, address: &Pubkey, checked_at: i64) -> Result<bool>;

    fn remove(&mut self, address: &Pubkey) -> Result<bool>;
}

/// Append-only persistence for audit entries.
pub trait AuditStore: Send {
    fn append(&mut self, entry: &AuditEntry) -> Result<()>;

    /// All entries in append order.
    fn entries(&self) -> Result<Vec<AuditEntry>>;
}

/// Opens the configured backend, returning independent index and audit handles.
pub fn open_stores(config: &StorageConfig) -> Result<(AccountIndex, AuditLog)> {
    match config.backend {
        StorageBackend::Sqlite => {
            let index = SqliteStore::open(&config.index_path)?;
            let audit = SqliteStore::open(&config.index_path)?;
            Ok((AccountIndex::new(Box::new(index)), AuditLog::new(Box::new(audit))))
        }
        StorageBackend::Json => {
            let index = JsonIndexStore::open(&config.index_path)?;
            let audit = JsonAuditStore::open(&config.audit_path)?;
            Ok((AccountIndex::new(Box::new(index)), AuditLog::new(Box::new(audit))))
        }
    }
}
