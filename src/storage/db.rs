use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;

use crate::{
    error::{ReclaimError, Result},
    storage::{
        models::{AuditAction, AuditEntry, TrackedAccountRecord},
        AuditStore, IndexStore,
    },
};

/// SQLite-backed index and audit store.
///
/// Registration uses `INSERT OR IGNORE` on the primary key, so concurrent
/// pipelines sharing one database file cannot create duplicate records.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(10))?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS tracked_accounts (
                address TEXT PRIMARY KEY,
                claimed_owner_program TEXT NOT NULL,
                rent_paid_at_creation INTEGER NOT NULL,
                creation_height INTEGER NOT NULL,
                creation_proof_ref TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                last_checked_at INTEGER
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                iso_timestamp TEXT NOT NULL,
                action TEXT NOT NULL,
                address TEXT,
                details TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_audit_action ON audit_log(action)",
            [],
        )?;

        Ok(())
    }

    fn record_from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, i64, i64, String, i64, Option<i64>)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }

    fn to_record(
        raw: (String, String, i64, i64, String, i64, Option<i64>),
    ) -> Result<TrackedAccountRecord> {
        let (address, owner, rent, height, proof, created_at, last_checked_at) = raw;
        Ok(TrackedAccountRecord {
            address: Pubkey::from_str(&address)?,
            claimed_owner_program: Pubkey::from_str(&owner)?,
            rent_paid_at_creation: rent as u64,
            creation_height: height as u64,
            creation_proof_ref: proof,
            created_at,
            last_checked_at,
        })
    }
}

const RECORD_COLUMNS: &str = "address, claimed_owner_program, rent_paid_at_creation, \
     creation_height, creation_proof_ref, created_at, last_checked_at";

impl IndexStore for SqliteStore {
    fn get(&self, address: &Pubkey) -> Result<Option<TrackedAccountRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {} FROM tracked_accounts WHERE address = ?1", RECORD_COLUMNS),
                [address.to_string()],
                Self::record_from_row,
            )
            .optional()?;
        raw.map(Self::to_record).transpose()
    }

    fn list(&self) -> Result<Vec<TrackedAccountRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM tracked_accounts ORDER BY created_at, address",
            RECORD_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], Self::record_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(Self::to_record).collect()
    }

    fn insert_if_absent(&mut self, record: &TrackedAccountRecord) -> Result<bool> {
        let inserted = self.conn.execute(
            &format!(
                "INSERT OR IGNORE INTO tracked_accounts ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                RECORD_COLUMNS
            ),
            params![
                record.address.to_string(),
                record.claimed_owner_program.to_string(),
                record.rent_paid_at_creation as i64,
                record.creation_height as i64,
                record.creation_proof_ref,
                record.created_at,
                record.last_checked_at,
            ],
        )?;
        Ok(inserted == 1)
    }

    fn touch(&mut self, address: &Pubkey, checked_at: i64) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE tracked_accounts SET last_checked_at = ?1 WHERE address = ?2",
            params![checked_at, address.to_string()],
        )?;
        Ok(updated == 1)
    }

    fn remove(&mut self, address: &Pubkey) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM tracked_accounts WHERE address = ?1",
            [address.to_string()],
        )?;
        Ok(deleted == 1)
    }
}

impl AuditStore for SqliteStore {
    fn append(&mut self, entry: &AuditEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO audit_log (timestamp, iso_timestamp, action, address, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.timestamp,
                entry.iso_timestamp,
                entry.action.as_str(),
                entry.address,
                serde_json::to_string(&entry.details)?,
            ],
        )?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, iso_timestamp, action, address, details
             FROM audit_log ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(timestamp, iso_timestamp, action, address, details)| {
                let details: Map<String, Value> = serde_json::from_str(&details)
                    .map_err(|e| ReclaimError::InvalidRecord(format!("audit details: {}", e)))?;
                Ok(AuditEntry {
                    timestamp,
                    iso_timestamp,
                    action: AuditAction::from_str(&action)?,
                    address,
                    details,
                })
            })
            .collect()
    }
}
