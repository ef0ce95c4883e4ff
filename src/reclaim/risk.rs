use serde::{Deserialize, Serialize};
use solana_sdk::system_program;
use std::collections::BTreeSet;
use std::fmt;

use crate::{
    reclaim::classifier::TOKEN_ACCOUNT_LEN,
    solana::state::{AccountType, ObservedAccountState},
    storage::models::TrackedAccountRecord,
};

/// Byte offset of the `amount` field in an SPL token account
pub const TOKEN_AMOUNT_OFFSET: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskFlag {
    ProgramDerivedSuspect,
    UnknownOwner,
    HasTokenBalance,
    RecentlyActive,
    NonEmptyPayload,
}

impl RiskFlag {
    pub const ALL: [RiskFlag; 5] = [
        RiskFlag::ProgramDerivedSuspect,
        RiskFlag::UnknownOwner,
        RiskFlag::HasTokenBalance,
        RiskFlag::RecentlyActive,
        RiskFlag::NonEmptyPayload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskFlag::ProgramDerivedSuspect => "PROGRAM_DERIVED_SUSPECT",
            RiskFlag::UnknownOwner => "UNKNOWN_OWNER",
            RiskFlag::HasTokenBalance => "HAS_TOKEN_BALANCE",
            RiskFlag::RecentlyActive => "RECENTLY_ACTIVE",
            RiskFlag::NonEmptyPayload => "NON_EMPTY_PAYLOAD",
        }
    }
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulating set of risk flags. There is no way to remove a flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RiskFlags(BTreeSet<RiskFlag>);

impl RiskFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&mut self, flag: RiskFlag) {
        self.0.insert(flag);
    }

    pub fn contains(&self, flag: RiskFlag) -> bool {
        self.0.contains(&flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = RiskFlag> + '_ {
        self.0.iter().copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(|f| f.as_str()).collect()
    }
}

impl FromIterator<RiskFlag> for RiskFlags {
    fn from_iter<I: IntoIterator<Item = RiskFlag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Result of assessing one account
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    /// The account does not exist. Skipped silently, never a safety failure.
    NotEligible,
    Assessed(RiskFlags),
}

/// Reads the little-endian token amount from an SPL token account payload.
pub fn decode_token_amount(data: &[u8]) -> Option<u64> {
    let bytes = data.get(TOKEN_AMOUNT_OFFSET..TOKEN_AMOUNT_OFFSET + 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Some(u64::from_le_bytes(buf))
}

/// Derives risk flags from classified state and sponsorship metadata
#[derive(Debug, Clone)]
pub struct RiskAssessor {
    min_inactive_slots: u64,
}

impl RiskAssessor {
    pub fn new(min_inactive_slots: u64) -> Self {
        Self { min_inactive_slots }
    }

    pub fn assess(
        &self,
        state: &ObservedAccountState,
        record: &TrackedAccountRecord,
        current_height: u64,
    ) -> Assessment {
        if !state.exists {
            return Assessment::NotEligible;
        }

        let mut flags = RiskFlags::new();

        if state.is_program_derived_suspect {
            flags.raise(RiskFlag::ProgramDerivedSuspect);
            return Assessment::Assessed(flags);
        }

        if state.owner != system_program::id() && state.owner != record.claimed_owner_program {
            flags.raise(RiskFlag::UnknownOwner);
        }

        match state.account_type {
            AccountType::TokenHolding => {
                // an undecodable amount counts as a balance
                let amount = if state.data_len() == TOKEN_ACCOUNT_LEN {
                    decode_token_amount(&state.data)
                } else {
                    None
                };
                if amount != Some(0) {
                    flags.raise(RiskFlag::HasTokenBalance);
                }
                // token accounts are never reclaimed, even when empty
                flags.raise(RiskFlag::NonEmptyPayload);
            }
            AccountType::Native => {
                if state.data_len() > 0 {
                    flags.raise(RiskFlag::NonEmptyPayload);
                }
            }
            // no supported way to drain these
            AccountType::TokenMint | AccountType::Unknown => {
                flags.raise(RiskFlag::UnknownOwner);
            }
            AccountType::ProgramOwned => {
                flags.raise(RiskFlag::ProgramDerivedSuspect);
            }
        }

        let inactive_for = current_height.saturating_sub(record.creation_height);
        if inactive_for < self.min_inactive_slots {
            flags.raise(RiskFlag::RecentlyActive);
        }

        Assessment::Assessed(flags)
    }
}
