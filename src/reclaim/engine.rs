use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    instruction::Instruction,
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction,
    transaction::Transaction,
};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    details,
    error::{ReclaimError, Result},
    events::{EventBus, PipelineEvent},
    reclaim::gate::Approval,
    solana::{
        client::{ChainConnection, TxStatus},
        rent::RentCalculator,
        retry::{retry_with_backoff, RetryPolicy},
        state::AccountType,
    },
    storage::{AuditAction, AuditLog},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    DryRun,
    Live,
}

impl ExecutionMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            ExecutionMode::DryRun
        } else {
            ExecutionMode::Live
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::DryRun => f.write_str("dry_run"),
            ExecutionMode::Live => f.write_str("live"),
        }
    }
}

/// `pending -> simulated`, `pending -> submitted -> confirmed | failed`,
/// `pending -> failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReclaimStatus {
    Pending,
    Simulated,
    Submitted,
    Confirmed,
    Failed,
}

impl ReclaimStatus {
    pub fn can_transition_to(self, next: ReclaimStatus) -> bool {
        use ReclaimStatus::*;
        matches!(
            (self, next),
            (Pending, Simulated) | (Pending, Submitted) | (Pending, Failed) | (Submitted, Confirmed) | (Submitted, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReclaimStatus::Simulated | ReclaimStatus::Confirmed | ReclaimStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReclaimStatus::Pending => "pending",
            ReclaimStatus::Simulated => "simulated",
            ReclaimStatus::Submitted => "submitted",
            ReclaimStatus::Confirmed => "confirmed",
            ReclaimStatus::Failed => "failed",
        }
    }

    fn audit_action(self) -> Option<AuditAction> {
        match self {
            ReclaimStatus::Pending => None,
            ReclaimStatus::Simulated => Some(AuditAction::Simulated),
            ReclaimStatus::Submitted => Some(AuditAction::Submitted),
            ReclaimStatus::Confirmed => Some(AuditAction::Confirmed),
            ReclaimStatus::Failed => Some(AuditAction::Failed),
        }
    }
}

impl fmt::Display for ReclaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reclaim attempt. Only created from an `Approval`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReclaimAction {
    pub address: Pubkey,
    pub destination: Pubkey,
    pub amount: u64,
    pub status: ReclaimStatus,
    pub signature: Option<Signature>,
    pub error_detail: Option<String>,
    pub created_at: i64,
    pub executed_at: Option<i64>,
}

impl ReclaimAction {
    fn pending(approval: &Approval, destination: Pubkey) -> Self {
        Self {
            address: *approval.address(),
            destination,
            amount: approval.amount(),
            status: ReclaimStatus::Pending,
            signature: None,
            error_detail: None,
            created_at: Utc::now().timestamp(),
            executed_at: None,
        }
    }

    fn transition(&mut self, next: ReclaimStatus) -> Result<ReclaimStatus> {
        if !self.status.can_transition_to(next) {
            return Err(ReclaimError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        let previous = self.status;
        self.status = next;
        if next.is_terminal() {
            self.executed_at = Some(Utc::now().timestamp());
        }
        Ok(previous)
    }

    pub fn simulate(&mut self) -> Result<ReclaimStatus> {
        self.transition(ReclaimStatus::Simulated)
    }

    pub fn submit(&mut self, signature: Signature) -> Result<ReclaimStatus> {
        let previous = self.transition(ReclaimStatus::Submitted)?;
        self.signature = Some(signature);
        Ok(previous)
    }

    pub fn confirm(&mut self) -> Result<ReclaimStatus> {
        self.transition(ReclaimStatus::Confirmed)
    }

    pub fn fail(&mut self, detail: impl Into<String>) -> Result<ReclaimStatus> {
        let previous = self.transition(ReclaimStatus::Failed)?;
        self.error_detail = Some(detail.into());
        Ok(previous)
    }
}

/// Builds the transfer that empties an approved account into the treasury.
///
/// Only native accounts are reclaimed. Token-holding and every other type
/// are refused.
pub fn build_reclaim_instruction(approval: &Approval, treasury: &Pubkey) -> Result<Instruction> {
    match approval.account_type() {
        AccountType::Native => Ok(system_instruction::transfer(
            approval.address(),
            treasury,
            approval.amount(),
        )),
        other => Err(ReclaimError::Unsupported(other.to_string())),
    }
}

/// What a submitter did with an instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Simulated,
    Sent(Signature),
}

/// Execution capability injected into `ReclaimExecutor`.
#[async_trait]
pub trait Submitter: Send + Sync {
    fn mode(&self) -> ExecutionMode;

    /// Fee payer of submitted transactions.
    fn authority(&self) -> Pubkey;

    async fn submit(&self, instruction: Instruction) -> Result<Submission>;

    /// Waits for a terminal network status. Never returns `Pending`.
    async fn await_confirmation(&self, signature: &Signature) -> Result<TxStatus>;
}

/// Never touches the network.
pub struct DryRunSubmitter {
    authority: Pubkey,
}

impl DryRunSubmitter {
    pub fn new(authority: Pubkey) -> Self {
        Self { authority }
    }
}

#[async_trait]
impl Submitter for DryRunSubmitter {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::DryRun
    }

    fn authority(&self) -> Pubkey {
        self.authority
    }

    async fn submit(&self, instruction: Instruction) -> Result<Submission> {
        debug!(program = %instruction.program_id, accounts = instruction.accounts.len(), "Simulated instruction");
        Ok(Submission::Simulated)
    }

    async fn await_confirmation(&self, _signature: &Signature) -> Result<TxStatus> {
        Err(anyhow::anyhow!("dry-run submissions have no signature").into())
    }
}

/// Signs with the operator credential and submits over RPC.
pub struct RpcSubmitter {
    chain: Arc<dyn ChainConnection>,
    signer: Keypair,
    policy: RetryPolicy,
    poll_interval: Duration,
    timeout: Duration,
}

impl RpcSubmitter {
    pub fn new(
        chain: Arc<dyn ChainConnection>,
        signer: Keypair,
        policy: RetryPolicy,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            chain,
            signer,
            policy,
            poll_interval,
            timeout,
        }
    }

    pub fn from_config(chain: Arc<dyn ChainConnection>, signer: Keypair, config: &Config) -> Self {
        Self::new(
            chain,
            signer,
            config.retry_policy(),
            Duration::from_millis(config.rpc.confirm_poll_interval_ms),
            Duration::from_secs(config.rpc.confirm_timeout_secs),
        )
    }
}

#[async_trait]
impl Submitter for RpcSubmitter {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Live
    }

    fn authority(&self) -> Pubkey {
        self.signer.pubkey()
    }

    async fn submit(&self, instruction: Instruction) -> Result<Submission> {
        let blockhash = retry_with_backoff("get_latest_blockhash", &self.policy, || {
            self.chain.get_latest_blockhash()
        })
        .await
        .map_err(|e| e.last_error)?;

        let payer = self.signer.pubkey();
        let message = Message::new(&[instruction], Some(&payer));
        let mut transaction = Transaction::new_unsigned(message);
        // fails when the transfer source needs a signature the operator cannot give
        transaction.try_sign(&[&self.signer], blockhash)?;

        let signature = self.chain.send_transaction(&transaction).await?;
        Ok(Submission::Sent(signature))
    }

    async fn await_confirmation(&self, signature: &Signature) -> Result<TxStatus> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.chain.get_signature_status(signature).await {
                Ok(TxStatus::Pending) => {}
                Ok(status) => return Ok(status),
                Err(e) if e.is_transient() => {
                    warn!(%signature, error = %e, "Status poll failed, retrying");
                }
                Err(e) => return Err(e),
            }

            if Instant::now() >= deadline {
                return Err(ReclaimError::Timeout(format!(
                    "{} not confirmed within {}s",
                    signature,
                    self.timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Acts on approvals. Writes an audit entry and publishes an event for every
/// status transition.
pub struct ReclaimExecutor {
    treasury: Pubkey,
    submitter: Arc<dyn Submitter>,
}

impl ReclaimExecutor {
    pub fn new(treasury: Pubkey, submitter: Arc<dyn Submitter>) -> Self {
        Self { treasury, submitter }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.submitter.mode()
    }

    /// Per-account failures end as a `failed` action. Only audit failures
    /// are returned as errors.
    pub async fn execute(
        &self,
        approval: &Approval,
        audit: &mut AuditLog,
        events: &EventBus,
    ) -> Result<ReclaimAction> {
        let mut action = ReclaimAction::pending(approval, self.treasury);

        let instruction = match build_reclaim_instruction(approval, &self.treasury) {
            Ok(instruction) => instruction,
            Err(e) => {
                warn!(address = %action.address, error = %e, "Cannot build reclaim instruction");
                let from = action.fail(e.to_string())?;
                self.record(&action, from, audit, events)?;
                return Ok(action);
            }
        };

        let signature = match self.submitter.submit(instruction).await {
            Ok(Submission::Simulated) => {
                info!(
                    address = %action.address,
                    amount = action.amount,
                    destination = %action.destination,
                    "DRY RUN: would reclaim {}",
                    RentCalculator::format_sol(action.amount)
                );
                let from = action.simulate()?;
                self.record(&action, from, audit, events)?;
                return Ok(action);
            }
            Ok(Submission::Sent(signature)) => signature,
            Err(e) => {
                warn!(address = %action.address, error = %e, "Submission failed");
                let from = action.fail(e.to_string())?;
                self.record(&action, from, audit, events)?;
                return Ok(action);
            }
        };

        let from = action.submit(signature)?;
        self.record(&action, from, audit, events)?;

        let from = match self.submitter.await_confirmation(&signature).await {
            Ok(TxStatus::Succeeded) => {
                info!(
                    address = %action.address,
                    %signature,
                    "Reclaimed {}",
                    RentCalculator::format_sol(action.amount)
                );
                action.confirm()?
            }
            Ok(TxStatus::Failed(detail)) => {
                warn!(address = %action.address, %signature, %detail, "Reclaim transaction failed");
                action.fail(detail)?
            }
            Ok(TxStatus::Pending) => action.fail("confirmation still pending")?,
            Err(e) => {
                warn!(address = %action.address, %signature, error = %e, "Confirmation failed");
                action.fail(e.to_string())?
            }
        };
        self.record(&action, from, audit, events)?;

        Ok(action)
    }

    fn record(
        &self,
        action: &ReclaimAction,
        from: ReclaimStatus,
        audit: &mut AuditLog,
        events: &EventBus,
    ) -> Result<()> {
        if let Some(audit_action) = action.status.audit_action() {
            let mut details = details! {
                "amount" => action.amount,
                "destination" => action.destination.to_string(),
                "mode" => self.mode().to_string(),
                "from" => from.as_str(),
            };
            if let Some(signature) = &action.signature {
                details.insert("signature".to_string(), signature.to_string().into());
            }
            if let Some(error) = &action.error_detail {
                details.insert("error".to_string(), error.clone().into());
            }
            audit.record(audit_action, Some(&action.address), details)?;
        }

        events.publish(PipelineEvent::Transition {
            address: action.address,
            from,
            to: action.status,
            amount: action.amount,
            signature: action.signature.map(|s| s.to_string()),
            error_detail: action.error_detail.clone(),
        });
        Ok(())
    }
}
