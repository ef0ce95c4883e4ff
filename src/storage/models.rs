use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::str::FromStr;

use crate::error::{ReclaimError, Result};

/// Base58 string (de)serialization for `Pubkey`
pub mod pubkey_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(pubkey: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&pubkey.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let s = String::deserialize(deserializer)?;
        Pubkey::from_str(&s).map_err(D::Error::custom)
    }
}

/// Metadata recorded when the operator sponsored an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedAccountRecord {
    #[serde(with = "pubkey_string")]
    pub address: Pubkey,
    #[serde(with = "pubkey_string")]
    pub claimed_owner_program: Pubkey,
    /// Lamports paid at creation
    pub rent_paid_at_creation: u64,
    /// Slot of the creation transaction
    pub creation_height: u64,
    /// Creation transaction signature, or any opaque provenance string
    pub creation_proof_ref: String,
    /// Unix seconds
    pub created_at: i64,
    #[serde(default)]
    pub last_checked_at: Option<i64>,
}

impl TrackedAccountRecord {
    /// Parses one element of an import file, applying record-level checks.
    pub fn from_value(value: Value) -> Result<Self> {
        let record: TrackedAccountRecord = serde_json::from_value(value)
            .map_err(|e| ReclaimError::InvalidRecord(e.to_string()))?;
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> Result<()> {
        if self.address == Pubkey::default() {
            return Err(ReclaimError::InvalidRecord("address is the default pubkey".to_string()));
        }
        if self.address == self.claimed_owner_program {
            return Err(ReclaimError::InvalidRecord(format!(
                "{} claims itself as owner program",
                self.address
            )));
        }
        if self.created_at < 0 {
            return Err(ReclaimError::InvalidRecord(format!(
                "{} has a negative creation time",
                self.address
            )));
        }
        if let Some(checked) = self.last_checked_at {
            if checked < self.created_at {
                return Err(ReclaimError::InvalidRecord(format!(
                    "{} was checked before it was created",
                    self.address
                )));
            }
        }
        Ok(())
    }
}

/// Pipeline state transitions recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Indexed,
    Analyzed,
    Skipped,
    Approved,
    Rejected,
    Simulated,
    Submitted,
    Confirmed,
    Failed,
    Removed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Indexed => "indexed",
            AuditAction::Analyzed => "analyzed",
            AuditAction::Skipped => "skipped",
            AuditAction::Approved => "approved",
            AuditAction::Rejected => "rejected",
            AuditAction::Simulated => "simulated",
            AuditAction::Submitted => "submitted",
            AuditAction::Confirmed => "confirmed",
            AuditAction::Failed => "failed",
            AuditAction::Removed => "removed",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = ReclaimError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "indexed" => AuditAction::Indexed,
            "analyzed" => AuditAction::Analyzed,
            "skipped" => AuditAction::Skipped,
            "approved" => AuditAction::Approved,
            "rejected" => AuditAction::Rejected,
            "simulated" => AuditAction::Simulated,
            "submitted" => AuditAction::Submitted,
            "confirmed" => AuditAction::Confirmed,
            "failed" => AuditAction::Failed,
            "removed" => AuditAction::Removed,
            other => return Err(ReclaimError::InvalidRecord(format!("unknown audit action {}", other))),
        })
    }
}

/// Immutable audit record. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Unix seconds
    pub timestamp: i64,
    pub iso_timestamp: String,
    pub action: AuditAction,
    pub address: Option<String>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, address: Option<&Pubkey>, details: Map<String, Value>) -> Self {
        Self::at(Utc::now(), action, address, details)
    }

    pub fn at(
        time: DateTime<Utc>,
        action: AuditAction,
        address: Option<&Pubkey>,
        details: Map<String, Value>,
    ) -> Self {
        Self {
            timestamp: time.timestamp(),
            iso_timestamp: time.to_rfc3339(),
            action,
            address: address.map(|a| a.to_string()),
            details,
        }
    }

    pub fn detail_u64(&self, key: &str) -> Option<u64> {
        self.details.get(key).and_then(|v| v.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_serializes_as_camel_case_base58() {
        let address = Pubkey::new_unique();
        let owner = solana_sdk::system_program::id();
        let record = TrackedAccountRecord {
            address,
            claimed_owner_program: owner,
            rent_paid_at_creation: 890_880,
            creation_height: 1_000,
            creation_proof_ref: "sig".to_string(),
            created_at: 1_700_000_000,
            last_checked_at: None,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["address"], json!(address.to_string()));
        assert_eq!(value["claimedOwnerProgram"], json!(owner.to_string()));
        assert_eq!(value["rentPaidAtCreation"], json!(890_880));
    }

    #[test]
    fn test_from_value_rejects_invalid_elements() {
        let bad_pubkey = json!({
            "address": "not-base58!",
            "claimedOwnerProgram": "11111111111111111111111111111111",
            "rentPaidAtCreation": 1,
            "creationHeight": 1,
            "creationProofRef": "x",
            "createdAt": 1
        });
        assert!(TrackedAccountRecord::from_value(bad_pubkey).is_err());

        let address = Pubkey::new_unique().to_string();
        let self_owned = json!({
            "address": address,
            "claimedOwnerProgram": address,
            "rentPaidAtCreation": 1,
            "creationHeight": 1,
            "creationProofRef": "x",
            "createdAt": 1
        });
        assert!(TrackedAccountRecord::from_value(self_owned).is_err());

        let negative_rent = json!({
            "address": Pubkey::new_unique().to_string(),
            "claimedOwnerProgram": "11111111111111111111111111111111",
            "rentPaidAtCreation": -5,
            "creationHeight": 1,
            "creationProofRef": "x",
            "createdAt": 1
        });
        assert!(TrackedAccountRecord::from_value(negative_rent).is_err());
    }

    #[test]
    fn test_audit_action_round_trips_through_str() {
        for action in [AuditAction::Indexed, AuditAction::Rejected, AuditAction::Confirmed] {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        assert!("exploded".parse::<AuditAction>().is_err());
    }
}
