//! Core types for the federated-learning registry

use std::fmt;
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Error returned when parsing an identifier from its base58 form.
#[derive(Debug, thiserror::Error)]
#[error("invalid identifier: {0}")]
pub struct ParseIdError(String);

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
            BorshSerialize, BorshDeserialize, Serialize, Deserialize,
        )]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Derive an identifier by hashing a real-world seed.
            /// The seed itself is never stored and cannot be recovered.
            pub fn from_seed(seed: &[u8]) -> Self {
                Self(*blake3::hash(seed).as_bytes())
            }

            /// Generate a random identifier (for tests and local tooling).
            pub fn new_unique() -> Self {
                Self(rand::random())
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", bs58::encode(&self.0).into_string())
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = bs58::decode(s)
                    .into_vec()
                    .map_err(|e| ParseIdError(e.to_string()))?;
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| ParseIdError(format!("expected 32 bytes: {s}")))?;
                Ok(Self(arr))
            }
        }
    };
}

opaque_id!(
    /// Opaque patient identifier (hash of a real-world identity).
    PatientId
);
opaque_id!(
    /// Opaque learning-task identifier.
    TaskId
);
opaque_id!(
    /// Identity of a participating training client (ed25519 verifying key).
    ClientId
);
opaque_id!(
    /// Identity of a committee member (ed25519 verifying key).
    MemberId
);

/// A 32-byte content hash: commit hash, reveal hash, or model artifact hash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// The unset sentinel. A round's model hash stays zero until finalization.
    pub const ZERO: Digest = Digest([0u8; 32]);

    /// Hash arbitrary content.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(&self.0).into_string())
    }
}

impl FromStr for Digest {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| ParseIdError(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ParseIdError(format!("expected 32 bytes: {s}")))?;
        Ok(Self(arr))
    }
}

/// Composite key for everything scoped to a single round.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash,
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct RoundKey {
    pub task_id: TaskId,
    pub round_index: u64,
}

impl RoundKey {
    pub fn new(task_id: TaskId, round_index: u64) -> Self {
        Self {
            task_id,
            round_index,
        }
    }
}

/// Per-(patient, task) consent record. One row per key; overwritten on
/// grant/revoke, no history kept here (history lives in the event journal).
#[derive(
    Debug, Clone, PartialEq,
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Consent {
    pub allowed: bool,
    /// Unix timestamp of the last grant or revoke.
    pub granted_at: i64,
    pub scope: String,
}

/// One federated-learning round for a task.
#[derive(
    Debug, Clone, PartialEq,
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Round {
    pub task_id: TaskId,
    /// Monotonic per-task index, starting at 1 with no gaps.
    pub round_index: u64,
    /// Unix timestamp the round was opened.
    pub start_at: i64,
    /// Unix timestamp the round was closed; 0 while the round is open.
    pub end_at: i64,
    pub max_participants: u32,
    /// Differential-privacy budget parameters for this round.
    pub epsilon: f64,
    pub delta: f64,
    pub closed: bool,
    /// Zero until the committee finalizes the aggregated model artifact.
    pub model_hash: Digest,
}

impl Round {
    pub fn is_finalized(&self) -> bool {
        !self.model_hash.is_zero()
    }
}

/// A masked-update commitment from a training client.
///
/// Append-only per round; flipped to `revealed` exactly once by a matching
/// reveal. A client may hold several commitments in the same round.
#[derive(
    Debug, Clone, PartialEq,
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Participant {
    pub client_id: ClientId,
    pub commit_hash: Digest,
    pub revealed: bool,
}

/// A single committee vote for a model artifact hash. Never deduplicated;
/// finalization tallies the full multiset in cast order.
#[derive(
    Debug, Clone, PartialEq,
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct CommitteeVote {
    pub voter_id: MemberId,
    pub model_hash: Digest,
}

/// Round configuration handed to a consenting training client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlConfig {
    pub round_index: u64,
    pub epsilon: f64,
    pub delta: f64,
    pub max_participants: u32,
    pub closed: bool,
}

impl From<&Round> for FlConfig {
    fn from(round: &Round) -> Self {
        Self {
            round_index: round.round_index,
            epsilon: round.epsilon,
            delta: round.delta,
            max_participants: round.max_participants,
            closed: round.closed,
        }
    }
}
