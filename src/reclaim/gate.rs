use solana_sdk::pubkey::Pubkey;

use crate::{
    reclaim::risk::{RiskFlag, RiskFlags},
    solana::state::{AccountType, ObservedAccountState},
};

pub const APPROVED_REASON: &str = "all checks passed";

/// Permission to reclaim one account. Only `SafetyGate` can create one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approval {
    address: Pubkey,
    amount: u64,
    account_type: AccountType,
}

impl Approval {
    pub fn address(&self) -> &Pubkey {
        &self.address
    }

    /// The whole observed balance.
    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type
    }
}

/// A rejection always carries at least one flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    address: Pubkey,
    balance: u64,
    flags: RiskFlags,
}

impl Rejection {
    pub fn address(&self) -> &Pubkey {
        &self.address
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn flags(&self) -> &RiskFlags {
        &self.flags
    }

    /// The snapshot had nothing to reclaim, whatever the flags say.
    pub fn empty_snapshot(&self) -> bool {
        self.balance == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    Approved(Approval),
    Rejected(Rejection),
}

impl SafetyVerdict {
    pub fn address(&self) -> &Pubkey {
        match self {
            SafetyVerdict::Approved(a) => &a.address,
            SafetyVerdict::Rejected(r) => &r.address,
        }
    }

    pub fn approved(&self) -> bool {
        matches!(self, SafetyVerdict::Approved(_))
    }

    pub fn flags(&self) -> RiskFlags {
        match self {
            SafetyVerdict::Approved(_) => RiskFlags::new(),
            SafetyVerdict::Rejected(r) => r.flags.clone(),
        }
    }

    /// Flag names joined with `, ` when rejected.
    pub fn reason(&self) -> String {
        match self {
            SafetyVerdict::Approved(_) => APPROVED_REASON.to_string(),
            SafetyVerdict::Rejected(r) => r.flags.names().join(", "),
        }
    }
}

/// Pure fail-closed gate: approved iff the flag set is empty
pub struct SafetyGate;

impl SafetyGate {
    pub fn evaluate(state: &ObservedAccountState, flags: RiskFlags) -> SafetyVerdict {
        let mut flags = flags;

        // UNKNOWN_OWNER here means an absent or zero-balance snapshot; the
        // owner itself may be known (see `Rejection::empty_snapshot`)
        if !state.exists || state.balance == 0 {
            flags.raise(RiskFlag::UnknownOwner);
        }

        if flags.is_empty() {
            SafetyVerdict::Approved(Approval {
                address: state.address,
                amount: state.balance,
                account_type: state.account_type,
            })
        } else {
            SafetyVerdict::Rejected(Rejection {
                address: state.address,
                balance: state.balance,
                flags,
            })
        }
    }
}
