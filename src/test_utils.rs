//! Shared fixtures for unit tests.

#![cfg(test)]

use async_trait::async_trait;
use solana_sdk::{
    account::Account,
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use solana_transaction_status::EncodedConfirmedTransactionWithStatusMeta;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::{
    error::{ReclaimError, Result},
    reclaim::risk::TOKEN_AMOUNT_OFFSET,
    reclaim::classifier::TOKEN_ACCOUNT_LEN,
    solana::{
        client::{ChainConnection, SignatureInfo, TxStatus},
        state::ObservedAccountState,
    },
    storage::{models::TrackedAccountRecord, AccountIndex, AuditLog, SqliteStore},
};

pub const RENT_MINIMUM: u64 = 890_880;
pub const CREATED_AT: i64 = 1_700_000_000;

/// An address with a matching private key, so the curve check never fires.
pub fn on_curve_address() -> Pubkey {
    Keypair::new().pubkey()
}

pub fn observed(address: Pubkey, owner: Pubkey, lamports: u64, data: Vec<u8>) -> ObservedAccountState {
    ObservedAccountState {
        address,
        exists: true,
        balance: lamports,
        owner,
        data,
        rent_exempt_minimum: RENT_MINIMUM,
        account_type: crate::solana::state::AccountType::Unknown,
        is_program_derived_suspect: false,
    }
}

pub fn record_for(address: Pubkey, owner: Pubkey, creation_height: u64) -> TrackedAccountRecord {
    TrackedAccountRecord {
        address,
        claimed_owner_program: owner,
        rent_paid_at_creation: RENT_MINIMUM,
        creation_height,
        creation_proof_ref: "sig".to_string(),
        created_at: CREATED_AT,
        last_checked_at: None,
    }
}

/// SPL token account payload with the given amount.
pub fn token_account_data(amount: u64) -> Vec<u8> {
    let mut data = vec![0u8; TOKEN_ACCOUNT_LEN];
    data[TOKEN_AMOUNT_OFFSET..TOKEN_AMOUNT_OFFSET + 8].copy_from_slice(&amount.to_le_bytes());
    data
}

pub fn memory_stores() -> (AccountIndex, AuditLog) {
    (
        AccountIndex::new(Box::new(SqliteStore::in_memory().unwrap())),
        AuditLog::new(Box::new(SqliteStore::in_memory().unwrap())),
    )
}

/// In-memory chain for pipeline scenarios.
///
/// Sent transactions are recorded but never applied, so balances only change
/// through `set_account`.
pub struct FakeChain {
    slot: Mutex<u64>,
    accounts: Mutex<HashMap<Pubkey, Account>>,
    unreachable: Mutex<HashSet<Pubkey>>,
    slot_unavailable: Mutex<bool>,
    send_error: Mutex<Option<String>>,
    outcomes: Mutex<VecDeque<TxStatus>>,
    statuses: Mutex<HashMap<Signature, TxStatus>>,
    pending_polls: Mutex<u32>,
    sent: Mutex<Vec<Transaction>>,
}

impl FakeChain {
    pub fn new(slot: u64) -> Self {
        Self {
            slot: Mutex::new(slot),
            accounts: Mutex::new(HashMap::new()),
            unreachable: Mutex::new(HashSet::new()),
            slot_unavailable: Mutex::new(false),
            send_error: Mutex::new(None),
            outcomes: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(HashMap::new()),
            pending_polls: Mutex::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_account(&self, address: Pubkey, owner: Pubkey, lamports: u64, data: Vec<u8>) {
        self.accounts.lock().unwrap().insert(
            address,
            Account {
                lamports,
                data,
                owner,
                executable: false,
                rent_epoch: 0,
            },
        );
    }

    pub fn balance(&self, address: &Pubkey) -> Option<u64> {
        self.accounts.lock().unwrap().get(address).map(|a| a.lamports)
    }

    /// Every `get_account` for this address fails with a transport error.
    pub fn make_unreachable(&self, address: Pubkey) {
        self.unreachable.lock().unwrap().insert(address);
    }

    pub fn fail_slot(&self) {
        *self.slot_unavailable.lock().unwrap() = true;
    }

    pub fn fail_sends(&self, reason: &str) {
        *self.send_error.lock().unwrap() = Some(reason.to_string());
    }

    /// Final status of the next sent transaction. Defaults to `Succeeded`.
    pub fn push_outcome(&self, status: TxStatus) {
        self.outcomes.lock().unwrap().push_back(status);
    }

    /// Number of `Pending` answers before each final status.
    pub fn set_pending_polls(&self, polls: u32) {
        *self.pending_polls.lock().unwrap() = polls;
    }

    pub fn sent(&self) -> Vec<Transaction> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainConnection for FakeChain {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>> {
        if self.unreachable.lock().unwrap().contains(address) {
            return Err(ReclaimError::Transport("connection reset".to_string()));
        }
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn get_slot(&self) -> Result<u64> {
        if *self.slot_unavailable.lock().unwrap() {
            return Err(ReclaimError::Timeout("getSlot".to_string()));
        }
        Ok(*self.slot.lock().unwrap())
    }

    async fn get_minimum_balance_for_rent_exemption(&self, _data_len: usize) -> Result<u64> {
        Ok(RENT_MINIMUM)
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        Ok(Hash::new_unique())
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature> {
        if let Some(reason) = self.send_error.lock().unwrap().clone() {
            return Err(ReclaimError::Transport(reason));
        }
        let signature = transaction.signatures.first().copied().unwrap_or_default();
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TxStatus::Succeeded);
        self.statuses.lock().unwrap().insert(signature, outcome);
        self.sent.lock().unwrap().push(transaction.clone());
        Ok(signature)
    }

    async fn get_signature_status(&self, signature: &Signature) -> Result<TxStatus> {
        {
            let mut pending = self.pending_polls.lock().unwrap();
            if *pending > 0 {
                *pending -= 1;
                return Ok(TxStatus::Pending);
            }
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(signature)
            .cloned()
            .unwrap_or(TxStatus::Pending))
    }

    async fn get_signatures_for_address(
        &self,
        _address: &Pubkey,
        _before: Option<Signature>,
        _limit: usize,
    ) -> Result<Vec<SignatureInfo>> {
        Ok(Vec::new())
    }

    async fn get_transaction(
        &self,
        _signature: &Signature,
    ) -> Result<Option<EncodedConfirmedTransactionWithStatusMeta>> {
        Ok(None)
    }
}
