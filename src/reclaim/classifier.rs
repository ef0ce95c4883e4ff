use solana_program::program_pack::Pack;
use solana_sdk::{pubkey::Pubkey, system_program};

use crate::{
    solana::state::{AccountType, ObservedAccountState},
    storage::models::TrackedAccountRecord,
};

/// Byte length of an SPL mint account
pub const MINT_LEN: usize = spl_token::state::Mint::LEN;
/// Byte length of an SPL token holding account
pub const TOKEN_ACCOUNT_LEN: usize = spl_token::state::Account::LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub account_type: AccountType,
    pub is_program_derived_suspect: bool,
}

/// True when the address is not a valid ed25519 point, i.e. no private key
/// can exist for it. Program-derived addresses are always off-curve.
pub fn is_off_curve(address: &Pubkey) -> bool {
    !address.is_on_curve()
}

/// Assigns a semantic account type to raw on-chain state.
///
/// The program-derived check is an owner-mismatch heuristic: anything owned
/// by a program other than the system program and the claimed owner is
/// treated as program-derived. With `curve_check` enabled an off-curve
/// address is also marked suspect, which can only add suspicion.
#[derive(Debug, Clone)]
pub struct AccountClassifier {
    curve_check: bool,
}

impl AccountClassifier {
    pub fn new(curve_check: bool) -> Self {
        Self { curve_check }
    }

    pub fn classify(&self, state: &ObservedAccountState, record: &TrackedAccountRecord) -> Classification {
        let owner = state.owner;
        let native = system_program::id();
        let token = spl_token::id();

        let (account_type, mut suspect) = if owner == native {
            (AccountType::Native, false)
        } else if owner == token && state.data_len() == MINT_LEN {
            (AccountType::TokenMint, false)
        } else if owner == token && state.data_len() == TOKEN_ACCOUNT_LEN {
            (AccountType::TokenHolding, false)
        } else if owner != record.claimed_owner_program {
            (AccountType::ProgramOwned, true)
        } else {
            (AccountType::Unknown, false)
        };

        if self.curve_check && is_off_curve(&state.address) {
            suspect = true;
        }

        Classification {
            account_type,
            is_program_derived_suspect: suspect,
        }
    }

    /// Classifies and writes the result back into the snapshot.
    pub fn apply(&self, mut state: ObservedAccountState, record: &TrackedAccountRecord) -> ObservedAccountState {
        let classification = self.classify(&state, record);
        state.account_type = classification.account_type;
        state.is_program_derived_suspect = classification.is_program_derived_suspect;
        state
    }
}

impl Default for AccountClassifier {
    fn default() -> Self {
        Self::new(true)
    }
}
