use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::{
    error::{ReclaimError, Result},
    storage::{json::write_atomic, models::TrackedAccountRecord, IndexStore},
};

/// Outcome of a bulk import
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    /// Addresses newly added by this import
    pub registered: Vec<Pubkey>,
    pub imported: usize,
    pub duplicates: usize,
    pub invalid: usize,
}

/// Registry of sponsored accounts the operator tracks
pub struct AccountIndex {
    store: Box<dyn IndexStore>,
}

impl AccountIndex {
    pub fn new(store: Box<dyn IndexStore>) -> Self {
        Self { store }
    }

    /// Inserts if absent. An existing record is never overwritten.
    pub fn register(&mut self, record: &TrackedAccountRecord) -> Result<bool> {
        record.validate()?;
        let inserted = self.store.insert_if_absent(record)?;
        if inserted {
            debug!(address = %record.address, "Registered account");
        } else {
            debug!(address = %record.address, "Account already tracked, ignoring");
        }
        Ok(inserted)
    }

    pub fn get(&self, address: &Pubkey) -> Result<Option<TrackedAccountRecord>> {
        self.store.get(address)
    }

    pub fn list(&self) -> Result<Vec<TrackedAccountRecord>> {
        self.store.list()
    }

    pub fn addresses(&self) -> Result<Vec<Pubkey>> {
        Ok(self.list()?.into_iter().map(|r| r.address).collect())
    }

    pub fn mark_checked(&mut self, address: &Pubkey, checked_at: i64) -> Result<bool> {
        self.store.touch(address, checked_at)
    }

    /// Only called after a confirmed reclaim.
    pub fn remove(&mut self, address: &Pubkey) -> Result<bool> {
        self.store.remove(address)
    }

    /// Registers each record independently. Invalid records and duplicates
    /// are skipped without aborting the batch. Store errors still propagate.
    pub fn import_bulk(&mut self, records: Vec<TrackedAccountRecord>) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        for record in records {
            match self.register(&record) {
                Ok(true) => {
                    report.imported += 1;
                    report.registered.push(record.address);
                }
                Ok(false) => report.duplicates += 1,
                Err(ReclaimError::InvalidRecord(reason)) => {
                    warn!(address = %record.address, %reason, "Skipping invalid record");
                    report.invalid += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Imports a JSON array of records. Elements that fail to parse are
    /// counted as invalid rather than failing the whole file.
    pub fn import_values(&mut self, values: Vec<Value>) -> Result<ImportReport> {
        let mut parsed = Vec::with_capacity(values.len());
        let mut invalid = 0;
        for (position, value) in values.into_iter().enumerate() {
            match TrackedAccountRecord::from_value(value) {
                Ok(record) => parsed.push(record),
                Err(e) => {
                    warn!(position, error = %e, "Skipping malformed record");
                    invalid += 1;
                }
            }
        }

        let mut report = self.import_bulk(parsed)?;
        report.invalid += invalid;
        Ok(report)
    }

    pub fn import_file(&mut self, path: impl AsRef<Path>) -> Result<ImportReport> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let values: Vec<Value> = serde_json::from_str(&raw)?;
        let report = self.import_values(values)?;
        info!(
            file = %path.display(),
            imported = report.imported,
            duplicates = report.duplicates,
            invalid = report.invalid,
            "Import complete"
        );
        Ok(report)
    }

    pub fn export_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let records = self.list()?;
        write_atomic(path.as_ref(), &records)?;
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{JsonIndexStore, SqliteStore};
    use crate::test_utils::record_for;
    use serde_json::json;
    use solana_sdk::system_program;

    fn sqlite_index() -> AccountIndex {
        AccountIndex::new(Box::new(SqliteStore::in_memory().unwrap()))
    }

    #[test]
    fn test_duplicate_registration_reports_zero_imported() {
        let mut index = sqlite_index();
        let record = record_for(Pubkey::new_unique(), system_program::id(), 100);

        let first = index.import_bulk(vec![record.clone()]).unwrap();
        assert_eq!(first.imported, 1);

        let second = index.import_bulk(vec![record.clone()]).unwrap();
        assert_eq!(second.imported, 0);
        assert_eq!(second.duplicates, 1);

        let matching = index
            .list()
            .unwrap()
            .into_iter()
            .filter(|r| r.address == record.address)
            .count();
        assert_eq!(matching, 1);
    }

    #[test]
    fn test_import_skips_invalid_records_without_aborting() {
        let mut index = sqlite_index();
        let good = record_for(Pubkey::new_unique(), system_program::id(), 100);
        let mut bad = record_for(Pubkey::new_unique(), system_program::id(), 100);
        bad.claimed_owner_program = bad.address;

        let report = index.import_bulk(vec![bad, good.clone()]).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.invalid, 1);
        assert_eq!(report.registered, vec![good.address]);
        assert!(index.get(&good.address).unwrap().is_some());
    }

    #[test]
    fn test_import_file_tolerates_malformed_elements() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import.json");
        let good = record_for(Pubkey::new_unique(), system_program::id(), 100);
        let file = json!([
            serde_json::to_value(&good).unwrap(),
            { "address": "garbage" },
            42
        ]);
        fs::write(&path, file.to_string()).unwrap();

        let mut index = sqlite_index();
        let report = index.import_file(&path).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.invalid, 2);
    }

    #[test]
    fn test_export_then_import_into_json_store() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("export.json");

        let mut source = sqlite_index();
        source
            .import_bulk(vec![
                record_for(Pubkey::new_unique(), system_program::id(), 1),
                record_for(Pubkey::new_unique(), spl_token::id(), 2),
            ])
            .unwrap();
        assert_eq!(source.export_file(&export).unwrap(), 2);

        let store = JsonIndexStore::open(dir.path().join("index.json")).unwrap();
        let mut target = AccountIndex::new(Box::new(store));
        let report = target.import_file(&export).unwrap();
        assert_eq!(report.imported, 2);
        assert_eq!(target.list().unwrap().len(), 2);
    }
}
