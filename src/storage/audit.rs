use serde::Serialize;
use serde_json::{Map, Value};
use solana_sdk::pubkey::Pubkey;
use std::collections::BTreeMap;
use tracing::error;

use crate::{
    error::{ReclaimError, Result},
    storage::{
        models::{AuditAction, AuditEntry},
        AuditStore,
    },
};

/// Entry counts grouped by action
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    pub counts: BTreeMap<AuditAction, usize>,
    pub total: usize,
}

impl AuditSummary {
    pub fn count(&self, action: AuditAction) -> usize {
        self.counts.get(&action).copied().unwrap_or(0)
    }
}

/// Append-only audit trail of every pipeline transition.
///
/// A failed append is fatal: it surfaces as `ReclaimError::AuditUnwritable`.
pub struct AuditLog {
    store: Box<dyn AuditStore>,
}

impl AuditLog {
    pub fn new(store: Box<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub fn append(&mut self, entry: AuditEntry) -> Result<AuditEntry> {
        if let Err(e) = self.store.append(&entry) {
            error!(action = %entry.action, error = %e, "Audit append failed");
            return Err(ReclaimError::AuditUnwritable(e.to_string()));
        }
        Ok(entry)
    }

    pub fn record(
        &mut self,
        action: AuditAction,
        address: Option<&Pubkey>,
        details: Map<String, Value>,
    ) -> Result<AuditEntry> {
        self.append(AuditEntry::new(action, address, details))
    }

    pub fn entries(&self) -> Result<Vec<AuditEntry>> {
        self.store.entries()
    }

    pub fn entries_for(&self, address: &Pubkey) -> Result<Vec<AuditEntry>> {
        let address = address.to_string();
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.address.as_deref() == Some(address.as_str()))
            .collect())
    }

    pub fn summary(&self) -> Result<AuditSummary> {
        Ok(summarize(&self.entries()?))
    }
}

pub fn summarize(entries: &[AuditEntry]) -> AuditSummary {
    let mut summary = AuditSummary::default();
    for entry in entries {
        *summary.counts.entry(entry.action).or_insert(0) += 1;
        summary.total += 1;
    }
    summary
}

/// Builds a details map from key/value pairs.
#[macro_export]
macro_rules! details {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = serde_json::Map::new();
        $( map.insert($key.to_string(), serde_json::json!($value)); )*
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;

    struct BrokenStore;

    impl AuditStore for BrokenStore {
        fn append(&mut self, _entry: &AuditEntry) -> Result<()> {
            Err(ReclaimError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only filesystem",
            )))
        }

        fn entries(&self) -> Result<Vec<AuditEntry>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_summary_groups_by_action() {
        let mut log = AuditLog::new(Box::new(SqliteStore::in_memory().unwrap()));
        let address = Pubkey::new_unique();
        log.record(AuditAction::Analyzed, Some(&address), details! {}).unwrap();
        log.record(AuditAction::Rejected, Some(&address), details! { "reason" => "UNKNOWN_OWNER" })
            .unwrap();
        log.record(AuditAction::Analyzed, None, details! {}).unwrap();

        let summary = log.summary().unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.count(AuditAction::Analyzed), 2);
        assert_eq!(summary.count(AuditAction::Rejected), 1);
        assert_eq!(summary.count(AuditAction::Confirmed), 0);
        assert_eq!(log.entries_for(&address).unwrap().len(), 2);
    }

    #[test]
    fn test_unwritable_store_is_fatal() {
        let mut log = AuditLog::new(Box::new(BrokenStore));
        let err = log.record(AuditAction::Indexed, None, details! {}).unwrap_err();
        assert!(matches!(err, ReclaimError::AuditUnwritable(_)));
        assert!(err.is_fatal());
    }
}
