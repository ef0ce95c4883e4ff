use chrono::Utc;
use serde_json::{Map, Value};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    details,
    error::Result,
    events::EventBus,
    reclaim::{
        batch::BatchSummary,
        classifier::AccountClassifier,
        engine::{ReclaimExecutor, ReclaimStatus, Submitter},
        gate::{SafetyGate, SafetyVerdict},
        risk::{Assessment, RiskAssessor},
    },
    solana::{
        client::ChainConnection,
        fetcher::{FetchOutcome, StateFetcher},
        rent::RentCalculator,
    },
    storage::{AccountIndex, AuditAction, AuditLog},
};

/// One sequential run over a batch of tracked addresses.
///
/// Each account goes fetch, classify, assess, gate, execute before the next
/// one starts. Per-account problems become a skip or a failed action; only
/// fatal errors (an unwritable audit log) are returned.
pub struct ReclaimPipeline {
    fetcher: StateFetcher,
    classifier: AccountClassifier,
    assessor: RiskAssessor,
    executor: ReclaimExecutor,
    index: AccountIndex,
    audit: AuditLog,
    events: EventBus,
}

impl ReclaimPipeline {
    pub fn new(
        chain: Arc<dyn ChainConnection>,
        submitter: Arc<dyn Submitter>,
        config: &Config,
        index: AccountIndex,
        audit: AuditLog,
        events: EventBus,
    ) -> Result<Self> {
        let treasury = config.treasury_wallet()?;
        Ok(Self {
            fetcher: StateFetcher::new(chain, config.retry_policy()),
            classifier: AccountClassifier::new(config.reclaim.curve_check),
            assessor: RiskAssessor::new(config.reclaim.min_inactive_slots),
            executor: ReclaimExecutor::new(treasury, submitter),
            index,
            audit,
            events,
        })
    }

    pub fn index(&self) -> &AccountIndex {
        &self.index
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub async fn process_batch(&mut self, addresses: &[Pubkey]) -> Result<BatchSummary> {
        let mut summary = BatchSummary::new(addresses.len());
        info!(
            accounts = addresses.len(),
            mode = %self.executor.mode(),
            "Processing batch"
        );

        // one height for the whole batch
        let height = match self.fetcher.current_height().await {
            Ok(height) => height,
            Err(e) => {
                warn!(error = %e, "Chain height unavailable, skipping batch");
                for address in addresses {
                    self.skip(address, "chain height unavailable", Map::new(), &mut summary)?;
                }
                return Ok(summary);
            }
        };

        for address in addresses {
            self.process_account(address, height, &mut summary).await?;
        }

        info!(
            approved = summary.approved,
            rejected = summary.rejected,
            skipped = summary.skipped,
            confirmed = summary.confirmed,
            failed = summary.failed,
            "Batch complete"
        );
        Ok(summary)
    }

    async fn process_account(&mut self, address: &Pubkey, height: u64, summary: &mut BatchSummary) -> Result<()> {
        let record = match self.index.get(address) {
            Ok(Some(record)) => record,
            Ok(None) => return self.skip(address, "not tracked", Map::new(), summary),
            Err(e) => {
                return self.skip(address, "index unreadable", details! { "error" => e.to_string() }, summary)
            }
        };

        let state = match self.fetcher.fetch(address).await {
            FetchOutcome::Observed(state) => self.classifier.apply(state, &record),
            FetchOutcome::NotFound => {
                return self.skip(address, "account does not exist", Map::new(), summary)
            }
            FetchOutcome::Unavailable { attempts, last_error } => {
                return self.skip(
                    address,
                    "state unavailable",
                    details! { "attempts" => attempts, "error" => last_error },
                    summary,
                )
            }
        };

        if let Err(e) = self.index.mark_checked(address, Utc::now().timestamp()) {
            warn!(%address, error = %e, "Failed to update last checked time");
        }

        let flags = match self.assessor.assess(&state, &record, height) {
            Assessment::NotEligible => {
                return self.skip(address, "account does not exist", Map::new(), summary)
            }
            Assessment::Assessed(flags) => flags,
        };

        self.audit.record(
            AuditAction::Analyzed,
            Some(address),
            details! {
                "accountType" => state.account_type.to_string(),
                "balance" => state.balance,
                "owner" => state.owner.to_string(),
                "dataLen" => state.data_len(),
                "rentExemptMinimum" => state.rent_exempt_minimum,
                "rentExempt" => RentCalculator::is_rent_exempt(state.balance, state.rent_exempt_minimum),
                "excessOverMinimum" => RentCalculator::excess_over_minimum(state.balance, state.rent_exempt_minimum),
                "programDerivedSuspect" => state.is_program_derived_suspect,
                "flags" => flags.names(),
                "currentHeight" => height,
            },
        )?;

        let verdict = SafetyGate::evaluate(&state, flags);
        let reason = verdict.reason();

        match verdict {
            SafetyVerdict::Rejected(rejection) => {
                info!(%address, %reason, "Rejected");
                self.audit.record(
                    AuditAction::Rejected,
                    Some(address),
                    details! {
                        "reason" => reason.clone(),
                        "flags" => rejection.flags().names(),
                        "balance" => rejection.balance(),
                        "emptySnapshot" => rejection.empty_snapshot(),
                    },
                )?;
                self.events.rejected(*address, rejection.balance(), reason.clone());
                summary.record_rejection(*address, reason);
            }
            SafetyVerdict::Approved(approval) => {
                debug!(%address, amount = approval.amount(), "Approved");
                self.audit.record(
                    AuditAction::Approved,
                    Some(address),
                    details! { "reason" => reason, "amount" => approval.amount() },
                )?;
                summary.approved += 1;

                let action = self.executor.execute(&approval, &mut self.audit, &self.events).await?;
                if action.status == ReclaimStatus::Confirmed {
                    self.retire(address)?;
                }
                summary.record_action(action);
            }
        }

        Ok(())
    }

    /// Drops a reclaimed account from the index.
    fn retire(&mut self, address: &Pubkey) -> Result<()> {
        match self.index.remove(address) {
            Ok(_) => {
                self.audit.record(AuditAction::Removed, Some(address), details! {})?;
            }
            Err(e) => warn!(%address, error = %e, "Reclaimed account could not be removed from index"),
        }
        Ok(())
    }

    fn skip(
        &mut self,
        address: &Pubkey,
        reason: &str,
        mut details: Map<String, Value>,
        summary: &mut BatchSummary,
    ) -> Result<()> {
        debug!(%address, reason, "Skipped");
        details.insert("reason".to_string(), reason.into());
        self.audit.record(AuditAction::Skipped, Some(address), details)?;
        summary.skipped += 1;
        Ok(())
    }
}
