use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::storage::{AuditAction, AuditEntry, TrackedAccountRecord};

/// Read-only aggregates over the index and the audit log
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub tracked_accounts: usize,
    pub total_rent_tracked: u64,
    pub action_counts: BTreeMap<AuditAction, usize>,
    pub total_reclaimed: u64,
    pub total_simulated: u64,
    /// Confirmed reclaims per UTC day
    pub daily_confirmed: BTreeMap<NaiveDate, DailyTotal>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DailyTotal {
    pub count: usize,
    pub lamports: u64,
}

impl DashboardSnapshot {
    pub fn build(records: &[TrackedAccountRecord], entries: &[AuditEntry]) -> Self {
        let mut snapshot = Self {
            tracked_accounts: records.len(),
            total_rent_tracked: records.iter().map(|r| r.rent_paid_at_creation).sum(),
            ..Self::default()
        };

        for entry in entries {
            *snapshot.action_counts.entry(entry.action).or_insert(0) += 1;
            let amount = entry.detail_u64("amount").unwrap_or(0);

            match entry.action {
                AuditAction::Simulated => snapshot.total_simulated += amount,
                AuditAction::Confirmed => {
                    snapshot.total_reclaimed += amount;
                    if let Some(time) = DateTime::from_timestamp(entry.timestamp, 0) {
                        let day = snapshot.daily_confirmed.entry(time.date_naive()).or_default();
                        day.count += 1;
                        day.lamports += amount;
                    }
                }
                _ => {}
            }
        }

        snapshot
    }

    pub fn count(&self, action: AuditAction) -> usize {
        self.action_counts.get(&action).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::details;
    use crate::test_utils::record_for;
    use chrono::{TimeZone, Utc};
    use solana_sdk::{pubkey::Pubkey, system_program};

    fn entry(day: u32, action: AuditAction, amount: u64) -> AuditEntry {
        let time = Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap();
        AuditEntry::at(time, action, Some(&Pubkey::new_unique()), details! { "amount" => amount })
    }

    #[test]
    fn test_snapshot_totals_and_timeline() {
        let records = vec![
            record_for(Pubkey::new_unique(), system_program::id(), 1),
            record_for(Pubkey::new_unique(), system_program::id(), 2),
        ];
        let entries = vec![
            entry(1, AuditAction::Confirmed, 1_000),
            entry(1, AuditAction::Confirmed, 2_000),
            entry(2, AuditAction::Confirmed, 500),
            entry(2, AuditAction::Simulated, 700),
            entry(2, AuditAction::Rejected, 9_999),
        ];

        let snapshot = DashboardSnapshot::build(&records, &entries);
        assert_eq!(snapshot.tracked_accounts, 2);
        assert_eq!(snapshot.total_rent_tracked, 2 * records[0].rent_paid_at_creation);
        assert_eq!(snapshot.total_reclaimed, 3_500);
        assert_eq!(snapshot.total_simulated, 700);
        assert_eq!(snapshot.count(AuditAction::Confirmed), 3);
        assert_eq!(snapshot.count(AuditAction::Rejected), 1);

        let first = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(snapshot.daily_confirmed[&first], DailyTotal { count: 2, lamports: 3_000 });
        assert_eq!(snapshot.daily_confirmed.len(), 2);
    }

    #[test]
    fn test_empty_inputs() {
        let snapshot = DashboardSnapshot::build(&[], &[]);
        assert_eq!(snapshot, DashboardSnapshot::default());
    }
}
