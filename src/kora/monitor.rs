use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::info;

use crate::{
    details,
    error::Result,
    solana::{accounts::AccountDiscovery, client::ChainConnection, retry::RetryPolicy},
    storage::{AccountIndex, AuditAction, AuditLog, ImportReport, TrackedAccountRecord},
};

/// Keeps the account index in step with what the operator has sponsored
pub struct KoraMonitor {
    discovery: AccountDiscovery,
}

impl KoraMonitor {
    pub fn new(chain: Arc<dyn ChainConnection>, operator_pubkey: Pubkey, policy: RetryPolicy) -> Self {
        Self {
            discovery: AccountDiscovery::new(chain, operator_pubkey, policy),
        }
    }

    /// Registers every newly discovered account. Already tracked accounts are
    /// left untouched.
    pub async fn sync_index(
        &self,
        index: &mut AccountIndex,
        audit: &mut AuditLog,
        max_transactions: usize,
    ) -> Result<ImportReport> {
        let discovered = self.discovery.discover(max_transactions).await?;
        let report = register_all(index, audit, discovered, "discovery")?;
        info!(
            imported = report.imported,
            duplicates = report.duplicates,
            invalid = report.invalid,
            "Index synced"
        );
        Ok(report)
    }
}

/// Bulk import that writes an `indexed` audit entry per new record.
pub fn register_all(
    index: &mut AccountIndex,
    audit: &mut AuditLog,
    records: Vec<TrackedAccountRecord>,
    source: &str,
) -> Result<ImportReport> {
    let report = index.import_bulk(records)?;
    audit_registered(index, audit, &report, source)?;
    Ok(report)
}

pub fn audit_registered(
    index: &AccountIndex,
    audit: &mut AuditLog,
    report: &ImportReport,
    source: &str,
) -> Result<()> {
    for address in &report.registered {
        let mut details = details! { "source" => source };
        if let Some(record) = index.get(address)? {
            details.insert("claimedOwnerProgram".to_string(), record.claimed_owner_program.to_string().into());
            details.insert("rentPaidAtCreation".to_string(), record.rent_paid_at_creation.into());
            details.insert("creationProofRef".to_string(), record.creation_proof_ref.into());
        }
        audit.record(AuditAction::Indexed, Some(address), details)?;
    }
    Ok(())
}
