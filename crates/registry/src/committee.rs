//! Committee membership and majority-vote finalization

use std::collections::HashSet;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::error::{RegistryError, Result};
use crate::types::{CommitteeVote, Digest, MemberId, RoundKey};

/// Validator committee: a self-amending membership set plus an append-only
/// vote log per round.
///
/// Byzantine-naive: membership governance is trusted, there is no quorum
/// threshold and no vote weighting. The tally is a deterministic
/// plurality count, not a BFT protocol.
#[derive(Default)]
pub struct CommitteeConsensus {
    members: RwLock<HashSet<MemberId>>,
    votes: DashMap<RoundKey, Vec<CommitteeVote>>,
}

impl CommitteeConsensus {
    pub fn new() -> Self {
        Self {
            members: RwLock::new(HashSet::new()),
            votes: DashMap::new(),
        }
    }

    /// Seed the genesis membership. Only valid while the committee is
    /// empty; afterwards membership changes go through `add_member`.
    pub fn bootstrap(&self, genesis: &[MemberId]) -> Result<()> {
        let mut members = self.members.write();
        if !members.is_empty() {
            return Err(RegistryError::Unauthorized);
        }
        members.extend(genesis.iter().copied());
        Ok(())
    }

    pub fn is_member(&self, id: &MemberId) -> bool {
        self.members.read().contains(id)
    }

    pub fn require_member(&self, id: &MemberId) -> Result<()> {
        if self.is_member(id) {
            Ok(())
        } else {
            Err(RegistryError::Unauthorized)
        }
    }

    /// Committee-only. Adding an existing member is a no-op.
    pub fn add_member(&self, caller: &MemberId, member: MemberId) -> Result<()> {
        self.require_member(caller)?;
        self.members.write().insert(member);
        Ok(())
    }

    /// Committee-only. Self-removal is permitted; the committee may vote
    /// itself empty.
    pub fn remove_member(&self, caller: &MemberId, member: &MemberId) -> Result<()> {
        self.require_member(caller)?;
        self.members.write().remove(member);
        Ok(())
    }

    pub fn member_count(&self) -> usize {
        self.members.read().len()
    }

    /// Committee-only. Appends to the vote sequence: no dedup, and no
    /// check that the round is closed. Only finalization enforces closure.
    pub fn vote(&self, voter_id: &MemberId, key: RoundKey, model_hash: Digest) -> Result<()> {
        self.require_member(voter_id)?;
        self.votes.entry(key).or_default().push(CommitteeVote {
            voter_id: *voter_id,
            model_hash,
        });
        Ok(())
    }

    pub fn votes_for(&self, key: &RoundKey) -> Vec<CommitteeVote> {
        self.votes.get(key).map(|v| v.clone()).unwrap_or_default()
    }

    /// Plurality tally over the full vote multiset. Candidates are visited
    /// in vote order and the current winner is kept unless a strictly
    /// greater count appears, so ties resolve to the first-encountered
    /// hash. Quadratic in the vote count, which stays small because the
    /// committee is small.
    pub fn tally(&self, key: &RoundKey) -> Option<Digest> {
        let votes = self.votes.get(key)?;
        let mut winner: Option<(Digest, usize)> = None;
        for vote in votes.iter() {
            let count = votes
                .iter()
                .filter(|v| v.model_hash == vote.model_hash)
                .count();
            match winner {
                Some((_, best)) if count <= best => {}
                _ => winner = Some((vote.model_hash, count)),
            }
        }
        winner.map(|(hash, _)| hash)
    }

    /// Membership snapshot for replay bypass paths.
    pub(crate) fn insert_member(&self, member: MemberId) {
        self.members.write().insert(member);
    }

    pub(crate) fn delete_member(&self, member: &MemberId) {
        self.members.write().remove(member);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskId;

    fn key() -> RoundKey {
        RoundKey::new(TaskId::new_unique(), 1)
    }

    fn committee_of(n: usize) -> (CommitteeConsensus, Vec<MemberId>) {
        let committee = CommitteeConsensus::new();
        let members: Vec<MemberId> = (0..n).map(|_| MemberId::new_unique()).collect();
        committee.bootstrap(&members).unwrap();
        (committee, members)
    }

    #[test]
    fn test_bootstrap_only_while_empty() {
        let (committee, members) = committee_of(2);
        assert!(committee.is_member(&members[0]));
        assert_eq!(
            committee.bootstrap(&[MemberId::new_unique()]),
            Err(RegistryError::Unauthorized)
        );
    }

    #[test]
    fn test_membership_is_committee_only() {
        let (committee, members) = committee_of(1);
        let outsider = MemberId::new_unique();

        assert_eq!(
            committee.add_member(&outsider, MemberId::new_unique()),
            Err(RegistryError::Unauthorized)
        );

        committee.add_member(&members[0], outsider).unwrap();
        assert!(committee.is_member(&outsider));

        committee.remove_member(&outsider, &members[0]).unwrap();
        assert!(!committee.is_member(&members[0]));
    }

    #[test]
    fn test_self_removal_is_permitted() {
        let (committee, members) = committee_of(1);
        committee.remove_member(&members[0], &members[0]).unwrap();
        assert_eq!(committee.member_count(), 0);
    }

    #[test]
    fn test_non_member_vote_rejected() {
        let (committee, _) = committee_of(1);
        assert_eq!(
            committee.vote(&MemberId::new_unique(), key(), Digest::of(b"x")),
            Err(RegistryError::Unauthorized)
        );
    }

    #[test]
    fn test_strict_majority_wins() {
        let (committee, members) = committee_of(3);
        let key = key();
        let a = Digest::of(b"model-a");
        let b = Digest::of(b"model-b");

        committee.vote(&members[0], key, a).unwrap();
        committee.vote(&members[1], key, a).unwrap();
        committee.vote(&members[2], key, b).unwrap();

        assert_eq!(committee.tally(&key), Some(a));
    }

    #[test]
    fn test_tie_breaks_to_first_encountered() {
        let (committee, members) = committee_of(2);
        let key = key();
        let a = Digest::of(b"model-a");
        let b = Digest::of(b"model-b");

        committee.vote(&members[0], key, a).unwrap();
        committee.vote(&members[1], key, b).unwrap();

        assert_eq!(committee.tally(&key), Some(a));
    }

    #[test]
    fn test_duplicate_votes_count_in_tally() {
        let (committee, members) = committee_of(2);
        let key = key();
        let a = Digest::of(b"model-a");
        let b = Digest::of(b"model-b");

        // One member voting twice outweighs two distinct voters' single
        // votes only by multiset count: [b, a, a] -> a.
        committee.vote(&members[0], key, b).unwrap();
        committee.vote(&members[1], key, a).unwrap();
        committee.vote(&members[1], key, a).unwrap();

        assert_eq!(committee.votes_for(&key).len(), 3);
        assert_eq!(committee.tally(&key), Some(a));
    }

    #[test]
    fn test_tally_empty_is_none() {
        let (committee, _) = committee_of(1);
        assert_eq!(committee.tally(&key()), None);
    }
}
