//! Commit/reveal participation records per round

use dashmap::DashMap;

use crate::error::{RegistryError, Result};
use crate::types::{ClientId, Digest, Participant, RoundKey};

/// Append-only participation log enforcing the two-phase commit-reveal
/// protocol and the per-round participant cap.
///
/// The round-closed gate lives in the registry orchestrator, which reads
/// the round ledger before appending here. A client may commit more than
/// once per round up to the cap; reveals consume entries in commit order,
/// one per call.
#[derive(Default)]
pub struct ParticipationLog {
    participants: DashMap<RoundKey, Vec<Participant>>,
}

impl ParticipationLog {
    pub fn new() -> Self {
        Self {
            participants: DashMap::new(),
        }
    }

    /// Append a masked-update commitment. The cap is inclusive: the
    /// `max_participants`-th commit succeeds, the next fails.
    pub fn commit(
        &self,
        key: RoundKey,
        client_id: ClientId,
        commit_hash: Digest,
        max_participants: u32,
    ) -> Result<()> {
        let mut entries = self.participants.entry(key).or_default();
        if entries.len() >= max_participants as usize {
            return Err(RegistryError::CapacityExceeded);
        }
        entries.push(Participant {
            client_id,
            commit_hash,
            revealed: false,
        });
        Ok(())
    }

    /// Mark the first unrevealed entry matching (client, commit hash) as
    /// revealed. Scan order is commit order; exactly one entry flips per
    /// call even when duplicates exist.
    pub fn reveal(&self, key: RoundKey, client_id: ClientId, commit_hash: Digest) -> Result<()> {
        let mut entries = self
            .participants
            .get_mut(&key)
            .ok_or(RegistryError::NoMatchingCommit)?;
        let entry = entries
            .iter_mut()
            .find(|p| !p.revealed && p.client_id == client_id && p.commit_hash == commit_hash)
            .ok_or(RegistryError::NoMatchingCommit)?;
        entry.revealed = true;
        Ok(())
    }

    /// Snapshot of the participant sequence in commit order.
    pub fn list(&self, key: &RoundKey) -> Vec<Participant> {
        self.participants
            .get(key)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, key: &RoundKey) -> usize {
        self.participants.get(key).map(|e| e.len()).unwrap_or(0)
    }
}
