//! ConversationLedger: the append-only record of one conversation.
//!
//! Responsibilities:
//! - Serialize appends from concurrent runs
//! - Commit a route's turns as one atomic batch
//! - Hand out consistent snapshots of the most recent window
//! - Mirror committed batches into the optional SQLite store
//!
//! The ledger is shared between runs through an `Arc`. It is never trimmed;
//! only reads are windowed. SQLite writes happen on a dedicated writer
//! thread, so appends never block the async runtime on disk I/O.

use std::sync::mpsc;
use std::sync::{Mutex, MutexGuard};
use std::thread::JoinHandle;

use chrono::Utc;
use uuid::Uuid;

use super::database::LedgerStore;
use super::errors::AgentError;
use super::types::{LedgerEntry, Turn};

// ─── ConversationLedger ─────────────────────────────────────────────────────

pub struct ConversationLedger {
    conversation_id: String,
    entries: Mutex<Vec<LedgerEntry>>,
    /// Fed only while the entries lock is held, so stored order matches.
    mirror: Option<StoreMirror>,
}

impl ConversationLedger {
    /// A fresh in-memory conversation with a random id.
    pub fn new() -> Self {
        Self {
            conversation_id: Uuid::new_v4().to_string(),
            entries: Mutex::new(Vec::new()),
            mirror: None,
        }
    }

    /// Mirror every future commit into `store`.
    pub fn with_store(mut self, store: LedgerStore) -> Result<Self, AgentError> {
        store.ensure_conversation(&self.conversation_id)?;
        self.mirror = Some(StoreMirror::start(self.conversation_id.clone(), store)?);
        Ok(self)
    }

    /// Reload a stored conversation and keep mirroring into the same store.
    pub fn resume(store: LedgerStore, conversation_id: &str) -> Result<Self, AgentError> {
        let entries = store
            .load_conversation(conversation_id)?
            .ok_or_else(|| AgentError::Store {
                reason: format!("conversation '{conversation_id}' not found"),
            })?;

        tracing::info!(
            conversation_id,
            turns = entries.len(),
            "resumed conversation from store"
        );

        Ok(Self {
            conversation_id: conversation_id.to_string(),
            entries: Mutex::new(entries),
            mirror: Some(StoreMirror::start(conversation_id.to_string(), store)?),
        })
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Append a single turn.
    pub fn append(&self, turn: Turn) -> LedgerEntry {
        let mut committed = self.append_all(vec![turn]);
        // append_all returns exactly one entry per input turn
        committed.remove(0)
    }

    /// Append `turns` as one batch: no other append can land between them.
    pub fn append_all(&self, turns: Vec<Turn>) -> Vec<LedgerEntry> {
        let mut entries = self.lock_entries();
        let now = Utc::now();
        let next_seq = entries.last().map_or(1, |e| e.seq + 1);

        let batch: Vec<LedgerEntry> = turns
            .into_iter()
            .enumerate()
            .map(|(i, turn)| LedgerEntry {
                seq: next_seq + i as u64,
                recorded_at: now,
                turn,
            })
            .collect();

        entries.extend(batch.iter().cloned());
        if let Some(mirror) = &self.mirror {
            mirror.submit(batch.clone());
        }
        batch
    }

    /// The last `n` turns, oldest first.
    pub fn window(&self, n: usize) -> Vec<Turn> {
        let entries = self.lock_entries();
        let start = entries.len().saturating_sub(n);
        entries[start..].iter().map(|e| e.turn.clone()).collect()
    }

    /// Every entry recorded so far.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.lock_entries().clone()
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    // A panic while holding the lock cannot leave a half-pushed batch, so a
    // poisoned lock still guards consistent data.
    fn lock_entries(&self) -> MutexGuard<'_, Vec<LedgerEntry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

// ─── StoreMirror ────────────────────────────────────────────────────────────

/// Writer thread that persists committed batches in the order submitted.
///
/// Dropping the mirror closes the queue and waits for pending batches to be
/// written.
struct StoreMirror {
    queue: Option<mpsc::Sender<Vec<LedgerEntry>>>,
    worker: Option<JoinHandle<()>>,
}

impl StoreMirror {
    fn start(conversation_id: String, mut store: LedgerStore) -> Result<Self, AgentError> {
        let (queue, batches) = mpsc::channel::<Vec<LedgerEntry>>();

        let worker = std::thread::Builder::new()
            .name("ledger-store".into())
            .spawn(move || {
                for batch in batches {
                    if let Err(e) = store.persist_batch(&conversation_id, &batch) {
                        tracing::warn!(
                            conversation_id = %conversation_id,
                            turns = batch.len(),
                            error = %e,
                            "failed to persist ledger batch"
                        );
                    }
                }
            })
            .map_err(|e| AgentError::Store {
                reason: format!("failed to start ledger writer: {e}"),
            })?;

        Ok(Self {
            queue: Some(queue),
            worker: Some(worker),
        })
    }

    fn submit(&self, batch: Vec<LedgerEntry>) {
        let Some(queue) = &self.queue else {
            return;
        };
        if let Err(mpsc::SendError(lost)) = queue.send(batch) {
            tracing::warn!(turns = lost.len(), "ledger writer is gone; batch not persisted");
        }
    }
}

impl Drop for StoreMirror {
    fn drop(&mut self) {
        drop(self.queue.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("ledger writer panicked");
            }
        }
    }
}

impl Default for ConversationLedger {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
