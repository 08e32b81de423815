//! Round lifecycle ledger: opening, parameterization, closing

use std::collections::BTreeMap;

use dashmap::DashMap;

use crate::error::{RegistryError, Result};
use crate::types::{Digest, Round, RoundKey, TaskId};

/// All rounds ever opened for one task. Indices are contiguous from 1.
#[derive(Debug, Default)]
struct RoundBook {
    latest: u64,
    rounds: BTreeMap<u64, Round>,
}

/// Append-only round ledger keyed by (task, round index).
///
/// Rounds are immutable once closed except for the later model-hash
/// write-back: closing and finalizing are separate steps, and off-chain
/// aggregation runs in the window between them.
/// Committee authorization for open/close is enforced by the registry
/// orchestrator before calls reach this ledger.
#[derive(Default)]
pub struct RoundLedger {
    books: DashMap<TaskId, RoundBook>,
}

impl RoundLedger {
    pub fn new() -> Self {
        Self {
            books: DashMap::new(),
        }
    }

    /// Allocate the next round index for a task and store the new round.
    pub fn open_round(
        &self,
        task_id: TaskId,
        epsilon: f64,
        delta: f64,
        max_participants: u32,
        ts: i64,
    ) -> u64 {
        let mut book = self.books.entry(task_id).or_default();
        book.latest += 1;
        let round_index = book.latest;
        book.rounds.insert(
            round_index,
            Round {
                task_id,
                round_index,
                start_at: ts,
                end_at: 0,
                max_participants,
                epsilon,
                delta,
                closed: false,
                model_hash: Digest::ZERO,
            },
        );
        round_index
    }

    /// Close a round. `closed` transitions false to true exactly once.
    pub fn close_round(&self, key: RoundKey, ts: i64) -> Result<()> {
        let mut book = self
            .books
            .get_mut(&key.task_id)
            .ok_or(RegistryError::RoundNotFound)?;
        let round = book
            .rounds
            .get_mut(&key.round_index)
            .ok_or(RegistryError::RoundNotFound)?;
        if round.closed {
            return Err(RegistryError::RoundClosed);
        }
        round.closed = true;
        round.end_at = ts;
        Ok(())
    }

    /// Write the finalized model hash into a round.
    pub fn set_model_hash(&self, key: RoundKey, model_hash: Digest) -> Result<()> {
        let mut book = self
            .books
            .get_mut(&key.task_id)
            .ok_or(RegistryError::RoundNotFound)?;
        let round = book
            .rounds
            .get_mut(&key.round_index)
            .ok_or(RegistryError::RoundNotFound)?;
        round.model_hash = model_hash;
        Ok(())
    }

    pub fn get_round(&self, key: &RoundKey) -> Option<Round> {
        self.books
            .get(&key.task_id)
            .and_then(|book| book.rounds.get(&key.round_index).cloned())
    }

    /// Highest round index ever allocated for a task; 0 if none.
    pub fn latest_round_index(&self, task_id: &TaskId) -> u64 {
        self.books.get(task_id).map(|book| book.latest).unwrap_or(0)
    }

    pub fn latest_round(&self, task_id: &TaskId) -> Option<Round> {
        self.books
            .get(task_id)
            .and_then(|book| book.rounds.get(&book.latest).cloned())
    }
}
