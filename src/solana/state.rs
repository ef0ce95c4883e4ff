use serde::{Deserialize, Serialize};
use solana_sdk::{account::Account, pubkey::Pubkey};
use std::fmt;

/// Semantic type of an on-chain account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    /// Owned by the system program
    Native,
    TokenMint,
    TokenHolding,
    /// Owned by a program other than the system program and the claimed owner
    ProgramOwned,
    Unknown,
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccountType::Native => "NATIVE",
            AccountType::TokenMint => "TOKEN_MINT",
            AccountType::TokenHolding => "TOKEN_HOLDING",
            AccountType::ProgramOwned => "PROGRAM_OWNED",
            AccountType::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Snapshot of an account as seen during one analysis pass.
///
/// Never persisted. When `exists` is false every other field is zeroed.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedAccountState {
    pub address: Pubkey,
    pub exists: bool,
    pub balance: u64,
    pub owner: Pubkey,
    pub data: Vec<u8>,
    pub rent_exempt_minimum: u64,
    pub account_type: AccountType,
    pub is_program_derived_suspect: bool,
}

impl ObservedAccountState {
    pub fn absent(address: Pubkey) -> Self {
        Self {
            address,
            exists: false,
            balance: 0,
            owner: Pubkey::default(),
            data: Vec::new(),
            rent_exempt_minimum: 0,
            account_type: AccountType::Unknown,
            is_program_derived_suspect: false,
        }
    }

    /// Unclassified state; `AccountClassifier` fills in the type.
    pub fn from_account(address: Pubkey, account: Account, rent_exempt_minimum: u64) -> Self {
        Self {
            address,
            exists: true,
            balance: account.lamports,
            owner: account.owner,
            data: account.data,
            rent_exempt_minimum,
            account_type: AccountType::Unknown,
            is_program_derived_suspect: false,
        }
    }

    pub fn data_len(&self) -> usize {
        self.data.len()
    }
}
