//! Patient federated-learning registry
//!
//! A stateful authority for privacy-governed federated learning:
//! - Per-(patient, task) consent tracking
//! - Round lifecycle with differential-privacy policy parameters
//! - Commit-then-reveal intake of masked model updates
//! - Committee majority-vote finalization of the model artifact hash
//!
//! The off-chain secure-aggregation numerics, model-blob storage, and the
//! HTTP transport live outside this crate; only hashes cross the boundary.

pub mod committee;
pub mod consent;
pub mod error;
pub mod event;
pub mod ledger;
pub mod participation;
pub mod persistence;
pub mod registry;
pub mod types;

#[cfg(test)]
mod tests;

pub use committee::CommitteeConsensus;
pub use consent::ConsentStore;
pub use error::RegistryError;
pub use event::RegistryEvent;
pub use ledger::RoundLedger;
pub use participation::ParticipationLog;
pub use persistence::{EventStore, JournalMetadata};
pub use registry::Registry;
pub use types::{
    ClientId, CommitteeVote, Consent, Digest, FlConfig, MemberId, Participant, PatientId, Round,
    RoundKey, TaskId,
};
