//! SQLite-based storage for friends and interactions.
//!
//! Every query is scoped by device identity, which stands in for a login
//! account. Interactions are append-only; deleting a friend hard-deletes the
//! friend and its history with no recovery path.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::contacts::{Friend, Interaction, NewFriend, NewInteraction, RelationType};
use crate::health::Cadence;

use super::data_dir;

/// Parse datetime from RFC3339 string with fallback to current time
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Decode the `next_topics` JSON text column; corrupt data reads as empty.
fn parse_next_topics(raw: Option<String>) -> Option<Vec<String>> {
    raw.map(|s| serde_json::from_str(&s).unwrap_or_default())
}

/// Build a Friend from a database row
fn row_to_friend(row: &rusqlite::Row) -> Result<Friend, rusqlite::Error> {
    let relation_str: String = row.get(4)?;
    let cadence_str: String = row.get(5)?;
    let created_str: String = row.get(7)?;
    let updated_str: String = row.get(8)?;

    Ok(Friend {
        id: row.get(0)?,
        device_id: row.get(1)?,
        name: row.get(2)?,
        nickname: row.get(3)?,
        relation_type: RelationType::parse(&relation_str),
        contact_frequency: Cadence::parse(&cadence_str),
        notes: row.get(6)?,
        created_at: parse_datetime_fallback(&created_str),
        updated_at: parse_datetime_fallback(&updated_str),
    })
}

/// Build an Interaction from a database row
fn row_to_interaction(row: &rusqlite::Row) -> Result<Interaction, rusqlite::Error> {
    let contacted_str: String = row.get(2)?;
    let created_str: String = row.get(5)?;
    let topics_raw: Option<String> = row.get(4)?;

    Ok(Interaction {
        id: row.get(0)?,
        friend_id: row.get(1)?,
        contacted_at: parse_datetime_fallback(&contacted_str),
        summary: row.get(3)?,
        next_topics: parse_next_topics(topics_raw),
        created_at: parse_datetime_fallback(&created_str),
    })
}

/// SQLite database for relationship storage.
///
/// Stores friends and their interaction history.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/friendkeeper/friendkeeper.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let path = data_dir()?.join("friendkeeper.db");
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS friends (
                id            TEXT PRIMARY KEY,
                device_id     TEXT NOT NULL,
                name          TEXT NOT NULL,
                nickname      TEXT,
                relation_type TEXT NOT NULL DEFAULT 'friend',
                contact_frequency TEXT NOT NULL DEFAULT 'monthly',
                notes         TEXT,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS interactions (
                id           TEXT PRIMARY KEY,
                friend_id    TEXT NOT NULL,
                contacted_at TEXT NOT NULL,
                summary      TEXT,
                next_topics  TEXT,
                created_at   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS checkout_sessions (
                checkout_id  TEXT PRIMARY KEY,
                device_id    TEXT NOT NULL,
                product_sku  TEXT NOT NULL,
                tokens_granted INTEGER NOT NULL,
                amount_cents INTEGER NOT NULL,
                status       TEXT NOT NULL DEFAULT 'pending',
                created_at   TEXT NOT NULL,
                completed_at TEXT
            );

            -- Create indexes for common query patterns
            CREATE INDEX IF NOT EXISTS idx_friends_device_id ON friends(device_id);
            CREATE INDEX IF NOT EXISTS idx_interactions_friend_id ON interactions(friend_id);
            CREATE INDEX IF NOT EXISTS idx_interactions_contacted_at ON interactions(friend_id, contacted_at);",
        )?;
        Ok(())
    }

    /// Insert a new friend owned by `device_id`.
    ///
    /// The caller is expected to have validated the input already.
    pub fn insert_friend(
        &self,
        device_id: &str,
        input: &NewFriend,
    ) -> Result<Friend, rusqlite::Error> {
        let now = Utc::now();
        let friend = Friend {
            id: Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            name: input.name.trim().to_string(),
            nickname: input.nickname.clone(),
            relation_type: input.relation_type.unwrap_or(RelationType::Friend),
            contact_frequency: input.contact_frequency.unwrap_or(Cadence::Monthly),
            notes: input.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        self.conn.execute(
            "INSERT INTO friends (id, device_id, name, nickname, relation_type, contact_frequency, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                friend.id,
                friend.device_id,
                friend.name,
                friend.nickname,
                friend.relation_type.as_str(),
                friend.contact_frequency.as_str(),
                friend.notes,
                friend.created_at.to_rfc3339(),
                friend.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(friend)
    }

    /// Fetch a friend by id, scoped to its owning device.
    pub fn get_friend(
        &self,
        device_id: &str,
        friend_id: &str,
    ) -> Result<Option<Friend>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, device_id, name, nickname, relation_type, contact_frequency, notes, created_at, updated_at
                 FROM friends WHERE id = ?1 AND device_id = ?2",
                params![friend_id, device_id],
                row_to_friend,
            )
            .optional()
    }

    /// List all friends for a device, oldest first.
    pub fn list_friends(&self, device_id: &str) -> Result<Vec<Friend>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, device_id, name, nickname, relation_type, contact_frequency, notes, created_at, updated_at
             FROM friends WHERE device_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![device_id], row_to_friend)?;
        rows.collect()
    }

    /// Hard-delete a friend and its interaction history.
    ///
    /// Returns `true` if a friend row was actually deleted.
    pub fn delete_friend(
        &self,
        device_id: &str,
        friend_id: &str,
    ) -> Result<bool, rusqlite::Error> {
        let deleted = self.conn.execute(
            "DELETE FROM friends WHERE id = ?1 AND device_id = ?2",
            params![friend_id, device_id],
        )?;
        if deleted > 0 {
            self.conn.execute(
                "DELETE FROM interactions WHERE friend_id = ?1",
                params![friend_id],
            )?;
        }
        Ok(deleted > 0)
    }

    /// Append an interaction to a friend's history.
    pub fn insert_interaction(
        &self,
        friend_id: &str,
        input: &NewInteraction,
    ) -> Result<Interaction, rusqlite::Error> {
        let now = Utc::now();
        let interaction = Interaction {
            id: Uuid::new_v4().to_string(),
            friend_id: friend_id.to_string(),
            contacted_at: input.contacted_at.unwrap_or(now),
            summary: input.summary.clone(),
            next_topics: input.next_topics.clone(),
            created_at: now,
        };
        let topics_json = interaction
            .next_topics
            .as_ref()
            .map(|topics| serde_json::to_string(topics).unwrap_or_else(|_| "[]".into()));
        self.conn.execute(
            "INSERT INTO interactions (id, friend_id, contacted_at, summary, next_topics, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                interaction.id,
                interaction.friend_id,
                interaction.contacted_at.to_rfc3339(),
                interaction.summary,
                topics_json,
                interaction.created_at.to_rfc3339(),
            ],
        )?;
        // Interaction logging is the only mutation a friend record sees.
        self.conn.execute(
            "UPDATE friends SET updated_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), friend_id],
        )?;
        Ok(interaction)
    }

    /// Interactions for a friend, newest first.
    pub fn interactions_for(
        &self,
        friend_id: &str,
        limit: usize,
    ) -> Result<Vec<Interaction>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, friend_id, contacted_at, summary, next_topics, created_at
             FROM interactions WHERE friend_id = ?1
             ORDER BY contacted_at DESC, id LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![friend_id, limit as i64], row_to_interaction)?;
        rows.collect()
    }

    /// Timestamp of the most recent logged contact, if any.
    pub fn last_contacted(
        &self,
        friend_id: &str,
    ) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
        let raw: Option<String> = self.conn.query_row(
            "SELECT MAX(contacted_at) FROM interactions WHERE friend_id = ?1",
            params![friend_id],
            |row| row.get(0),
        )?;
        Ok(raw.map(|s| parse_datetime_fallback(&s)))
    }
}
