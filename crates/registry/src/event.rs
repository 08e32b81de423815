//! Audit events for every mutating registry operation
//!
//! Each event carries the timestamp assigned when the operation first
//! executed, so replaying a journal reconstructs byte-identical state.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::types::{ClientId, Digest, MemberId, PatientId, TaskId};

/// One mutating registry operation, in commit order.
#[derive(
    Debug, Clone, PartialEq,
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum RegistryEvent {
    ConsentGranted {
        patient_id: PatientId,
        task_id: TaskId,
        scope: String,
        ts: i64,
    },
    ConsentRevoked {
        patient_id: PatientId,
        task_id: TaskId,
        ts: i64,
    },
    RoundOpened {
        task_id: TaskId,
        round_index: u64,
        epsilon: f64,
        delta: f64,
        max_participants: u32,
        ts: i64,
    },
    UpdateCommitted {
        task_id: TaskId,
        round_index: u64,
        client_id: ClientId,
        commit_hash: Digest,
        ts: i64,
    },
    /// Carries the reveal hash for the off-chain aggregator; the stored
    /// participant row only flips its `revealed` flag.
    UpdateRevealed {
        task_id: TaskId,
        round_index: u64,
        client_id: ClientId,
        commit_hash: Digest,
        reveal_hash: Digest,
        ts: i64,
    },
    RoundClosed {
        task_id: TaskId,
        round_index: u64,
        ts: i64,
    },
    VoteCast {
        task_id: TaskId,
        round_index: u64,
        voter_id: MemberId,
        model_hash: Digest,
        ts: i64,
    },
    ModelFinalized {
        task_id: TaskId,
        round_index: u64,
        model_hash: Digest,
        ts: i64,
    },
    MemberAdded {
        member_id: MemberId,
        ts: i64,
    },
    MemberRemoved {
        member_id: MemberId,
        ts: i64,
    },
}

impl RegistryEvent {
    /// Short name for logs and metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConsentGranted { .. } => "consent_granted",
            Self::ConsentRevoked { .. } => "consent_revoked",
            Self::RoundOpened { .. } => "round_opened",
            Self::UpdateCommitted { .. } => "update_committed",
            Self::UpdateRevealed { .. } => "update_revealed",
            Self::RoundClosed { .. } => "round_closed",
            Self::VoteCast { .. } => "vote_cast",
            Self::ModelFinalized { .. } => "model_finalized",
            Self::MemberAdded { .. } => "member_added",
            Self::MemberRemoved { .. } => "member_removed",
        }
    }

    pub fn ts(&self) -> i64 {
        match self {
            Self::ConsentGranted { ts, .. }
            | Self::ConsentRevoked { ts, .. }
            | Self::RoundOpened { ts, .. }
            | Self::UpdateCommitted { ts, .. }
            | Self::UpdateRevealed { ts, .. }
            | Self::RoundClosed { ts, .. }
            | Self::VoteCast { ts, .. }
            | Self::ModelFinalized { ts, .. }
            | Self::MemberAdded { ts, .. }
            | Self::MemberRemoved { ts, .. } => *ts,
        }
    }

    /// Serialize for the journal.
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("RegistryEvent serialization should not fail")
    }

    /// Deserialize from the journal.
    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}
