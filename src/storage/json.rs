use serde::{de::DeserializeOwned, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::{
    error::Result,
    storage::{
        models::{AuditEntry, TrackedAccountRecord},
        AuditStore, IndexStore,
    },
};

fn read_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&raw)?)
}

/// Write to a sibling temp file, then rename over the target.
pub(crate) fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = NamedTempFile::new_in(&dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Account index kept as a JSON array of records.
///
/// Single-owner: each mutation re-reads the file, but two processes writing
/// the same file can still lose updates.
pub struct JsonIndexStore {
    path: PathBuf,
    records: Vec<TrackedAccountRecord>,
}

impl JsonIndexStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = read_array(&path)?;
        Ok(Self { path, records })
    }

    fn reload(&mut self) -> Result<()> {
        self.records = read_array(&self.path)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        write_atomic(&self.path, &self.records)
    }
}

impl IndexStore for JsonIndexStore {
    fn get(&self, address: &Pubkey) -> Result<Option<TrackedAccountRecord>> {
        Ok(self.records.iter().find(|r| &r.address == address).cloned())
    }

    fn list(&self) -> Result<Vec<TrackedAccountRecord>> {
        Ok(self.records.clone())
    }

    fn insert_if_absent(&mut self, record: &TrackedAccountRecord) -> Result<bool> {
        self.reload()?;
        if self.records.iter().any(|r| r.address == record.address) {
            return Ok(false);
        }
        self.records.push(record.clone());
        self.flush()?;
        Ok(true)
    }

    fn touch(&mut self, address: &Pubkey, checked_at: i64) -> Result<bool> {
        self.reload()?;
        match self.records.iter_mut().find(|r| &r.address == address) {
            Some(record) => {
                record.last_checked_at = Some(checked_at);
                self.flush()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove(&mut self, address: &Pubkey) -> Result<bool> {
        self.reload()?;
        let before = self.records.len();
        self.records.retain(|r| &r.address != address);
        if self.records.len() == before {
            return Ok(false);
        }
        self.flush()?;
        Ok(true)
    }
}

/// Audit log kept as an append-only JSON array.
pub struct JsonAuditStore {
    path: PathBuf,
    entries: Vec<AuditEntry>,
}

impl JsonAuditStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = read_array(&path)?;
        Ok(Self { path, entries })
    }
}

impl AuditStore for JsonAuditStore {
    fn append(&mut self, entry: &AuditEntry) -> Result<()> {
        self.entries.push(entry.clone());
        if let Err(e) = write_atomic(&self.path, &self.entries) {
            self.entries.pop();
            return Err(e);
        }
        Ok(())
    }

    fn entries(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.entries.clone())
    }
}
