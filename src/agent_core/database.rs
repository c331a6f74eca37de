//! SQLite audit store for the conversation ledger.
//!
//! Uses `rusqlite` in synchronous mode; writes are small and happen under the
//! ledger's lock. WAL mode is enabled so the store can be inspected while a
//! conversation is running.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use super::errors::AgentError;
use super::types::{LedgerEntry, Turn};

// ─── LedgerStore ────────────────────────────────────────────────────────────

/// SQLite handle holding every committed turn of every conversation.
pub struct LedgerStore {
    conn: Connection,
}

impl LedgerStore {
    /// Open (or create) the store at the given path.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub fn open(path: &str) -> Result<Self, AgentError> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let store = Self { conn };
        store.create_tables()?;
        Ok(store)
    }

    /// Create all required tables if they don't exist.
    fn create_tables(&self) -> Result<(), AgentError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                last_activity TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                FOREIGN KEY (conversation_id) REFERENCES conversations(id),
                UNIQUE (conversation_id, seq)
            );

            CREATE INDEX IF NOT EXISTS idx_turns_conversation
                ON turns(conversation_id, seq);
            ",
        )?;
        Ok(())
    }

    // ─── Conversations ──────────────────────────────────────────────────

    /// Register a conversation id. Idempotent.
    pub fn ensure_conversation(&self, conversation_id: &str) -> Result<(), AgentError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO conversations (id) VALUES (?1)",
            params![conversation_id],
        )?;
        Ok(())
    }

    /// Whether a conversation with this id has been registered.
    pub fn conversation_exists(&self, conversation_id: &str) -> Result<bool, AgentError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM conversations WHERE id = ?1",
                params![conversation_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // ─── Turns ──────────────────────────────────────────────────────────

    /// Write a committed batch of turns in one transaction.
    pub fn persist_batch(
        &mut self,
        conversation_id: &str,
        entries: &[LedgerEntry],
    ) -> Result<(), AgentError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO turns (conversation_id, seq, recorded_at, kind, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for entry in entries {
                let payload = serde_json::to_string(&entry.turn)?;
                stmt.execute(params![
                    conversation_id,
                    entry.seq as i64,
                    entry.recorded_at.to_rfc3339(),
                    entry.turn.kind(),
                    payload,
                ])?;
            }
        }
        tx.execute(
            "UPDATE conversations SET last_activity = datetime('now') WHERE id = ?1",
            params![conversation_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// All stored turns of a conversation, in order.
    ///
    /// Returns `None` if the conversation was never registered.
    pub fn load_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Vec<LedgerEntry>>, AgentError> {
        if !self.conversation_exists(conversation_id)? {
            return Ok(None);
        }

        let mut stmt = self.conn.prepare(
            "SELECT seq, recorded_at, payload FROM turns
             WHERE conversation_id = ?1 ORDER BY seq ASC",
        )?;
        let entries = stmt
            .query_map(params![conversation_id], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(entries))
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let seq: i64 = row.get(0)?;
    let recorded_at: String = row.get(1)?;
    let payload: String = row.get(2)?;

    let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    let turn: Turn = serde_json::from_str(&payload)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(LedgerEntry {
        seq: seq as u64,
        recorded_at,
        turn,
    })
}

// ─── Tests ──────────────────────────────────────────────────────────────────
