//! Registry orchestrator
//!
//! Composes the consent store, round ledger, participation log, and
//! committee into one consistent state machine. The orchestrator adds no
//! business logic of its own: it sequences calls into the components,
//! stamps timestamps, journals the resulting events, and keeps the error
//! taxonomy uniform.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::committee::CommitteeConsensus;
use crate::consent::ConsentStore;
use crate::error::{RegistryError, Result};
use crate::event::RegistryEvent;
use crate::ledger::RoundLedger;
use crate::participation::ParticipationLog;
use crate::persistence::EventStore;
use crate::types::{
    ClientId, Digest, FlConfig, MemberId, Participant, PatientId, Round, RoundKey, TaskId,
};

/// The federated-learning registry.
///
/// Mutations serialize through one mutex per task partition: every
/// round-scoped write for a task takes the task lock, so concurrent
/// callers contend for a total order and no reader ever observes a
/// half-applied mutation. Consent and membership writes are single-store
/// operations and rely on their stores' own locking.
pub struct Registry {
    consent: ConsentStore,
    ledger: RoundLedger,
    participation: ParticipationLog,
    committee: CommitteeConsensus,
    task_locks: DashMap<TaskId, Arc<Mutex<()>>>,
    journal: Option<Arc<EventStore>>,
}

impl Registry {
    /// In-memory registry with no journal (tests, dry runs).
    pub fn new() -> Self {
        Self {
            consent: ConsentStore::new(),
            ledger: RoundLedger::new(),
            participation: ParticipationLog::new(),
            committee: CommitteeConsensus::new(),
            task_locks: DashMap::new(),
            journal: None,
        }
    }

    /// Registry that appends every mutation to the given journal.
    pub fn with_journal(journal: Arc<EventStore>) -> Self {
        Self {
            journal: Some(journal),
            ..Self::new()
        }
    }

    /// Rebuild state by applying every journaled event in order.
    /// Events are applied unconditionally: they were validated when
    /// first executed and carry their original timestamps.
    pub fn replay_journal(&self) -> anyhow::Result<u64> {
        let journal = self
            .journal
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("registry has no journal"))?;
        let events = journal.events()?;
        let count = events.len() as u64;
        for event in &events {
            self.apply_event(event);
        }
        tracing::info!("Replayed {} events from journal", count);
        Ok(count)
    }

    // ============ Consent ============

    pub fn grant_consent(&self, patient_id: PatientId, task_id: TaskId, scope: &str) {
        let ts = now();
        self.consent.grant(patient_id, task_id, scope, ts);
        self.record(RegistryEvent::ConsentGranted {
            patient_id,
            task_id,
            scope: scope.to_string(),
            ts,
        });
    }

    pub fn revoke_consent(&self, patient_id: PatientId, task_id: TaskId) {
        let ts = now();
        self.consent.revoke(patient_id, task_id, ts);
        self.record(RegistryEvent::ConsentRevoked {
            patient_id,
            task_id,
            ts,
        });
    }

    pub fn is_allowed(&self, patient_id: &PatientId, task_id: &TaskId) -> bool {
        self.consent.is_allowed(patient_id, task_id)
    }

    /// Consent gate plus the latest round's parameters, for training
    /// clients deciding whether and how to participate.
    pub fn get_fl_config(&self, patient_id: &PatientId, task_id: &TaskId) -> Result<FlConfig> {
        if !self.consent.is_allowed(patient_id, task_id) {
            return Err(RegistryError::ConsentDenied);
        }
        let round = self
            .ledger
            .latest_round(task_id)
            .ok_or(RegistryError::RoundNotFound)?;
        Ok(FlConfig::from(&round))
    }

    // ============ Rounds ============

    pub fn open_round(
        &self,
        caller: &MemberId,
        task_id: TaskId,
        epsilon: f64,
        delta: f64,
        max_participants: u32,
    ) -> Result<u64> {
        self.committee.require_member(caller)?;
        let lock = self.task_lock(task_id);
        let _guard = lock.lock();

        let ts = now();
        let round_index = self
            .ledger
            .open_round(task_id, epsilon, delta, max_participants, ts);
        self.record(RegistryEvent::RoundOpened {
            task_id,
            round_index,
            epsilon,
            delta,
            max_participants,
            ts,
        });
        tracing::info!("Opened round {} for task {}", round_index, task_id);
        Ok(round_index)
    }

    pub fn close_round(&self, caller: &MemberId, task_id: TaskId, round_index: u64) -> Result<()> {
        self.committee.require_member(caller)?;
        let lock = self.task_lock(task_id);
        let _guard = lock.lock();

        let ts = now();
        self.ledger.close_round(RoundKey::new(task_id, round_index), ts)?;
        self.record(RegistryEvent::RoundClosed {
            task_id,
            round_index,
            ts,
        });
        tracing::info!("Closed round {} for task {}", round_index, task_id);
        Ok(())
    }

    pub fn get_round(&self, task_id: TaskId, round_index: u64) -> Option<Round> {
        self.ledger.get_round(&RoundKey::new(task_id, round_index))
    }

    pub fn latest_round_index(&self, task_id: &TaskId) -> u64 {
        self.ledger.latest_round_index(task_id)
    }

    // ============ Participation ============

    /// Record a masked-update commitment. A closed or absent round both
    /// surface as `RoundClosed`.
    pub fn submit_commit(
        &self,
        task_id: TaskId,
        round_index: u64,
        client_id: ClientId,
        commit_hash: Digest,
    ) -> Result<()> {
        let lock = self.task_lock(task_id);
        let _guard = lock.lock();

        let key = RoundKey::new(task_id, round_index);
        let round = self.ledger.get_round(&key).ok_or(RegistryError::RoundClosed)?;
        if round.closed {
            return Err(RegistryError::RoundClosed);
        }
        self.participation
            .commit(key, client_id, commit_hash, round.max_participants)?;
        self.record(RegistryEvent::UpdateCommitted {
            task_id,
            round_index,
            client_id,
            commit_hash,
            ts: now(),
        });
        Ok(())
    }

    /// Disclose the reveal hash matching an earlier commitment.
    pub fn submit_reveal(
        &self,
        task_id: TaskId,
        round_index: u64,
        client_id: ClientId,
        commit_hash: Digest,
        reveal_hash: Digest,
    ) -> Result<()> {
        let lock = self.task_lock(task_id);
        let _guard = lock.lock();

        let key = RoundKey::new(task_id, round_index);
        self.participation.reveal(key, client_id, commit_hash)?;
        self.record(RegistryEvent::UpdateRevealed {
            task_id,
            round_index,
            client_id,
            commit_hash,
            reveal_hash,
            ts: now(),
        });
        Ok(())
    }

    pub fn list_participants(&self, task_id: TaskId, round_index: u64) -> Vec<Participant> {
        self.participation.list(&RoundKey::new(task_id, round_index))
    }

    // ============ Committee ============

    pub fn vote_finalize(
        &self,
        caller: &MemberId,
        task_id: TaskId,
        round_index: u64,
        model_hash: Digest,
    ) -> Result<()> {
        let lock = self.task_lock(task_id);
        let _guard = lock.lock();

        self.committee
            .vote(caller, RoundKey::new(task_id, round_index), model_hash)?;
        self.record(RegistryEvent::VoteCast {
            task_id,
            round_index,
            voter_id: *caller,
            model_hash,
            ts: now(),
        });
        Ok(())
    }

    /// Tally the cast votes and write the winner into the round.
    ///
    /// Re-invocation recomputes over the current vote multiset and
    /// overwrites the previous winner; there is no finalized-once guard.
    pub fn finalize_model(&self, task_id: TaskId, round_index: u64) -> Result<Digest> {
        let lock = self.task_lock(task_id);
        let _guard = lock.lock();

        let key = RoundKey::new(task_id, round_index);
        let round = self.ledger.get_round(&key).ok_or(RegistryError::RoundNotFound)?;
        if !round.closed {
            return Err(RegistryError::RoundNotClosed);
        }
        let winner = self.committee.tally(&key).ok_or(RegistryError::NoVotes)?;
        self.ledger.set_model_hash(key, winner)?;
        self.record(RegistryEvent::ModelFinalized {
            task_id,
            round_index,
            model_hash: winner,
            ts: now(),
        });
        tracing::info!(
            "Finalized round {} for task {}: model {}",
            round_index,
            task_id,
            winner
        );
        Ok(winner)
    }

    /// The finalized model hash, or None while finalization is pending.
    pub fn aggregate_result(&self, task_id: TaskId, round_index: u64) -> Result<Option<Digest>> {
        let round = self
            .ledger
            .get_round(&RoundKey::new(task_id, round_index))
            .ok_or(RegistryError::RoundNotFound)?;
        Ok(round.is_finalized().then_some(round.model_hash))
    }

    pub fn add_member(&self, caller: &MemberId, member: MemberId) -> Result<()> {
        self.committee.add_member(caller, member)?;
        self.record(RegistryEvent::MemberAdded {
            member_id: member,
            ts: now(),
        });
        Ok(())
    }

    pub fn remove_member(&self, caller: &MemberId, member: &MemberId) -> Result<()> {
        self.committee.remove_member(caller, member)?;
        self.record(RegistryEvent::MemberRemoved {
            member_id: *member,
            ts: now(),
        });
        Ok(())
    }

    pub fn is_member(&self, id: &MemberId) -> bool {
        self.committee.is_member(id)
    }

    pub fn member_count(&self) -> usize {
        self.committee.member_count()
    }

    /// Seed the genesis committee. Journaled as ordinary membership
    /// events so replay needs no out-of-band configuration.
    pub fn bootstrap_committee(&self, genesis: &[MemberId]) -> Result<()> {
        self.committee.bootstrap(genesis)?;
        let ts = now();
        for member in genesis {
            self.record(RegistryEvent::MemberAdded {
                member_id: *member,
                ts,
            });
        }
        tracing::info!("Bootstrapped committee with {} members", genesis.len());
        Ok(())
    }

    // ============ Replay ============

    /// Apply one journaled event without re-journaling it. Authorization
    /// is not re-checked: the event was authorized when first executed,
    /// and membership state evolves identically during an ordered replay.
    pub fn apply_event(&self, event: &RegistryEvent) {
        match event.clone() {
            RegistryEvent::ConsentGranted {
                patient_id,
                task_id,
                scope,
                ts,
            } => self.consent.grant(patient_id, task_id, &scope, ts),
            RegistryEvent::ConsentRevoked {
                patient_id,
                task_id,
                ts,
            } => self.consent.revoke(patient_id, task_id, ts),
            RegistryEvent::RoundOpened {
                task_id,
                round_index,
                epsilon,
                delta,
                max_participants,
                ts,
            } => {
                let allocated = self
                    .ledger
                    .open_round(task_id, epsilon, delta, max_participants, ts);
                if allocated != round_index {
                    tracing::warn!(
                        "Journal gap: round {} replayed as {} for task {}",
                        round_index,
                        allocated,
                        task_id
                    );
                }
            }
            RegistryEvent::UpdateCommitted {
                task_id,
                round_index,
                client_id,
                commit_hash,
                ..
            } => {
                let key = RoundKey::new(task_id, round_index);
                let cap = self
                    .ledger
                    .get_round(&key)
                    .map(|r| r.max_participants)
                    .unwrap_or(u32::MAX);
                if let Err(e) = self.participation.commit(key, client_id, commit_hash, cap) {
                    tracing::warn!("Journal replay: commit rejected: {}", e);
                }
            }
            RegistryEvent::UpdateRevealed {
                task_id,
                round_index,
                client_id,
                commit_hash,
                ..
            } => {
                let key = RoundKey::new(task_id, round_index);
                if let Err(e) = self.participation.reveal(key, client_id, commit_hash) {
                    tracing::warn!("Journal replay: reveal rejected: {}", e);
                }
            }
            RegistryEvent::RoundClosed {
                task_id,
                round_index,
                ts,
            } => {
                if let Err(e) = self.ledger.close_round(RoundKey::new(task_id, round_index), ts) {
                    tracing::warn!("Journal replay: close rejected: {}", e);
                }
            }
            RegistryEvent::VoteCast {
                task_id,
                round_index,
                voter_id,
                model_hash,
                ..
            } => {
                let key = RoundKey::new(task_id, round_index);
                if let Err(e) = self.committee.vote(&voter_id, key, model_hash) {
                    tracing::warn!("Journal replay: vote rejected: {}", e);
                }
            }
            RegistryEvent::ModelFinalized {
                task_id,
                round_index,
                model_hash,
                ..
            } => {
                let key = RoundKey::new(task_id, round_index);
                if let Err(e) = self.ledger.set_model_hash(key, model_hash) {
                    tracing::warn!("Journal replay: finalize rejected: {}", e);
                }
            }
            RegistryEvent::MemberAdded { member_id, .. } => {
                self.committee.insert_member(member_id);
            }
            RegistryEvent::MemberRemoved { member_id, .. } => {
                self.committee.delete_member(&member_id);
            }
        }
    }

    // ============ Internals ============

    fn task_lock(&self, task_id: TaskId) -> Arc<Mutex<()>> {
        self.task_locks
            .entry(task_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn record(&self, event: RegistryEvent) {
        tracing::debug!("Event: {}", event.kind());
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(&event) {
                tracing::error!("Failed to journal {} event: {}", event.kind(), e);
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
