//! Per-device credit ledger gating the paid generation feature.
//!
//! The ledger is the only mutable shared state in the engine, so it owns its
//! connection behind a mutex and performs check-and-decrement in a single
//! guarded UPDATE. Two concurrent generation requests from the same device
//! can therefore never both pass the balance check and overdraw.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{CoreError, Result};
use crate::identity::DeviceIdentity;
use crate::storage::data_dir;

/// Current credit counters for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub tokens_remaining: u32,
    pub free_trial_remaining: u32,
}

impl Balance {
    pub fn total(&self) -> u32 {
        self.tokens_remaining + self.free_trial_remaining
    }
}

/// Outcome of applying a purchase credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Credited,
    /// The purchase reference was seen before; nothing changed.
    AlreadySettled,
}

/// Credit ledger keyed by device identity.
///
/// New identities are lazily initialized with the free-trial grant on first
/// lookup. Counters never go negative; a consume with both counters at zero
/// is rejected outright with no partial debit.
pub struct CreditLedger {
    conn: Mutex<Connection>,
    free_trial_grant: u32,
}

impl CreditLedger {
    /// Open the ledger inside `~/.config/friendkeeper/friendkeeper.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(free_trial_grant: u32) -> Result<Self, Box<dyn std::error::Error>> {
        let path = data_dir()?.join("friendkeeper.db");
        Self::open_at(&path, free_trial_grant)
    }

    /// Open the ledger at an explicit path.
    pub fn open_at(
        path: &Path,
        free_trial_grant: u32,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open(path)?;
        let ledger = Self {
            conn: Mutex::new(conn),
            free_trial_grant,
        };
        ledger.migrate()?;
        Ok(ledger)
    }

    /// Open an in-memory ledger (for tests).
    pub fn open_memory(free_trial_grant: u32) -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open_in_memory()?;
        let ledger = Self {
            conn: Mutex::new(conn),
            free_trial_grant,
        };
        ledger.migrate()?;
        Ok(ledger)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS ledger (
                device_id          TEXT PRIMARY KEY,
                free_remaining     INTEGER NOT NULL,
                purchased_remaining INTEGER NOT NULL DEFAULT 0,
                created_at         TEXT NOT NULL,
                updated_at         TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS purchase_credits (
                purchase_ref TEXT PRIMARY KEY,
                device_id    TEXT NOT NULL,
                amount       INTEGER NOT NULL,
                credited_at  TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn ensure_row(conn: &Connection, device_id: &str, grant: u32) -> Result<(), rusqlite::Error> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR IGNORE INTO ledger (device_id, free_remaining, purchased_remaining, created_at, updated_at)
             VALUES (?1, ?2, 0, ?3, ?3)",
            params![device_id, grant, now],
        )?;
        Ok(())
    }

    fn read_balance(conn: &Connection, device_id: &str) -> Result<Balance, rusqlite::Error> {
        conn.query_row(
            "SELECT purchased_remaining, free_remaining FROM ledger WHERE device_id = ?1",
            params![device_id],
            |row| {
                Ok(Balance {
                    tokens_remaining: row.get(0)?,
                    free_trial_remaining: row.get(1)?,
                })
            },
        )
    }

    /// Current balance, lazily initializing new identities with the
    /// free-trial grant.
    pub fn balance(&self, identity: &DeviceIdentity) -> Result<Balance> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        Self::ensure_row(&conn, identity.as_str(), self.free_trial_grant)?;
        Ok(Self::read_balance(&conn, identity.as_str())?)
    }

    /// Whether the device has any generation credit left.
    pub fn has_balance(&self, identity: &DeviceIdentity) -> Result<bool> {
        Ok(self.balance(identity)?.total() > 0)
    }

    /// Atomically consume one generation unit.
    ///
    /// Free-trial credit is exhausted before purchased tokens. Rejects with
    /// `InsufficientBalance` when both counters are zero; no decrement
    /// happens in that case.
    pub fn consume_one(&self, identity: &DeviceIdentity) -> Result<Balance> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        Self::ensure_row(&conn, identity.as_str(), self.free_trial_grant)?;

        // Single guarded UPDATE: the WHERE clause is the balance check, the
        // CASE arms pick which counter to decrement.
        let changed = conn.execute(
            "UPDATE ledger SET
                free_remaining = free_remaining
                    - (CASE WHEN free_remaining > 0 THEN 1 ELSE 0 END),
                purchased_remaining = purchased_remaining
                    - (CASE WHEN free_remaining > 0 THEN 0
                            WHEN purchased_remaining > 0 THEN 1
                            ELSE 0 END),
                updated_at = ?2
             WHERE device_id = ?1 AND (free_remaining > 0 OR purchased_remaining > 0)",
            params![identity.as_str(), Utc::now().to_rfc3339()],
        )?;

        if changed == 0 {
            return Err(CoreError::InsufficientBalance);
        }
        Ok(Self::read_balance(&conn, identity.as_str())?)
    }

    /// Apply a purchase credit, idempotent per `purchase_ref`.
    ///
    /// Settlement events may be delivered more than once; replaying the same
    /// reference leaves the balance unchanged.
    pub fn credit(
        &self,
        identity: &DeviceIdentity,
        amount: u32,
        purchase_ref: &str,
    ) -> Result<(CreditOutcome, Balance)> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        Self::ensure_row(&conn, identity.as_str(), self.free_trial_grant)?;

        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO purchase_credits (purchase_ref, device_id, amount, credited_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![purchase_ref, identity.as_str(), amount, now],
        )?;

        let outcome = if inserted > 0 {
            tx.execute(
                "UPDATE ledger SET purchased_remaining = purchased_remaining + ?2, updated_at = ?3
                 WHERE device_id = ?1",
                params![identity.as_str(), amount, now],
            )?;
            CreditOutcome::Credited
        } else {
            CreditOutcome::AlreadySettled
        };
        tx.commit()?;

        Ok((outcome, Self::read_balance(&conn, identity.as_str())?))
    }
}
