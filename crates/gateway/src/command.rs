//! Signable command payloads
//!
//! Every mutating gateway method maps onto one `Command` variant. The
//! borsh encoding of the variant is the canonical byte string a caller
//! signs; the gateway rebuilds it from the JSON params and verifies the
//! signature over exactly these bytes.

use borsh::{BorshDeserialize, BorshSerialize};
use fl_registry::{Digest, MemberId, PatientId, TaskId};

/// Canonical payload for a signed mutating call.
///
/// Caller identity (the client committing an update, the member voting)
/// is never part of the payload: it is taken from the verified signer.
#[derive(Debug, Clone, PartialEq, BorshSerialize, BorshDeserialize)]
pub enum Command {
    GrantConsent {
        patient_id: PatientId,
        task_id: TaskId,
        scope: String,
    },
    RevokeConsent {
        patient_id: PatientId,
        task_id: TaskId,
    },
    OpenRound {
        task_id: TaskId,
        epsilon: f64,
        delta: f64,
        max_participants: u32,
    },
    CloseRound {
        task_id: TaskId,
        round_index: u64,
    },
    SubmitCommit {
        task_id: TaskId,
        round_index: u64,
        commit_hash: Digest,
    },
    SubmitReveal {
        task_id: TaskId,
        round_index: u64,
        commit_hash: Digest,
        reveal_hash: Digest,
    },
    VoteFinalize {
        task_id: TaskId,
        round_index: u64,
        model_hash: Digest,
    },
    FinalizeModel {
        task_id: TaskId,
        round_index: u64,
    },
    AddMember {
        member_id: MemberId,
    },
    RemoveMember {
        member_id: MemberId,
    },
}

impl Command {
    /// The canonical signable bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("Command serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}
