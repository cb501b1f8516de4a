//! Election state as the contract keeps it. Backs the development chain.

use std::collections::HashSet;

use ethers_core::types::Address;
use thiserror::Error;

use crate::models::{Candidate, CandidateDraft, Winner};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Only admin can perform this action")]
    NotAdmin,
    #[error("Election has ended")]
    ElectionEnded,
    #[error("Election is still ongoing")]
    ElectionOngoing,
    #[error("Invalid candidate ID")]
    UnknownCandidate,
    #[error("You have already voted")]
    AlreadyVoted,
}

#[derive(Debug, Clone)]
pub struct ElectionLedger {
    admin: Address,
    candidates: Vec<Candidate>,
    next_id: u64,
    voters: HashSet<Address>,
    ended: bool,
}

impl ElectionLedger {
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            candidates: Vec::new(),
            next_id: 1,
            voters: HashSet::new(),
            ended: false,
        }
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn election_ended(&self) -> bool {
        self.ended
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn add_candidate(
        &mut self,
        caller: Address,
        draft: CandidateDraft,
    ) -> Result<u64, LedgerError> {
        self.only_admin(caller)?;
        self.only_open()?;

        let id = self.next_id;
        self.next_id += 1;
        self.candidates.push(Candidate {
            id,
            name: draft.name,
            image: draft.image,
            age: draft.age,
            description: draft.description,
            vote_count: 0,
        });
        Ok(id)
    }

    pub fn edit_candidate(
        &mut self,
        caller: Address,
        id: u64,
        draft: CandidateDraft,
    ) -> Result<(), LedgerError> {
        self.only_admin(caller)?;
        let candidate = self.candidate_mut(id)?;
        candidate.name = draft.name;
        candidate.image = draft.image;
        candidate.age = draft.age;
        candidate.description = draft.description;
        Ok(())
    }

    pub fn remove_candidate(&mut self, caller: Address, id: u64) -> Result<(), LedgerError> {
        self.only_admin(caller)?;
        let index = self
            .candidates
            .iter()
            .position(|c| c.id == id)
            .ok_or(LedgerError::UnknownCandidate)?;
        self.candidates.remove(index);
        Ok(())
    }

    pub fn vote(&mut self, caller: Address, id: u64) -> Result<(), LedgerError> {
        self.only_open()?;
        if self.voters.contains(&caller) {
            return Err(LedgerError::AlreadyVoted);
        }
        self.candidate_mut(id)?.vote_count += 1;
        self.voters.insert(caller);
        Ok(())
    }

    pub fn end_election(&mut self, caller: Address) -> Result<(), LedgerError> {
        self.only_admin(caller)?;
        self.only_open()?;
        self.ended = true;
        Ok(())
    }

    pub fn start_new_election(&mut self, caller: Address) -> Result<(), LedgerError> {
        self.only_admin(caller)?;
        self.candidates.clear();
        self.voters.clear();
        self.next_id = 1;
        self.ended = false;
        Ok(())
    }

    /// Highest vote count wins; ties go to the earliest candidate.
    pub fn results(&self) -> Result<Winner, LedgerError> {
        if !self.ended {
            return Err(LedgerError::ElectionOngoing);
        }

        let mut winner = Winner::default();
        let mut best: Option<u64> = None;
        for candidate in &self.candidates {
            if best.map_or(true, |count| candidate.vote_count > count) {
                best = Some(candidate.vote_count);
                winner = Winner {
                    name: candidate.name.clone(),
                    vote_count: candidate.vote_count,
                };
            }
        }
        Ok(winner)
    }

    fn only_admin(&self, caller: Address) -> Result<(), LedgerError> {
        if caller != self.admin {
            return Err(LedgerError::NotAdmin);
        }
        Ok(())
    }

    fn only_open(&self) -> Result<(), LedgerError> {
        if self.ended {
            return Err(LedgerError::ElectionEnded);
        }
        Ok(())
    }

    fn candidate_mut(&mut self, id: u64) -> Result<&mut Candidate, LedgerError> {
        self.candidates
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(LedgerError::UnknownCandidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> CandidateDraft {
        CandidateDraft {
            name: name.to_string(),
            image: "https://x/img.png".to_string(),
            age: 40,
            description: "...".to_string(),
        }
    }

    fn setup() -> (ElectionLedger, Address, Address) {
        let admin = Address::from_low_u64_be(1);
        let voter = Address::from_low_u64_be(2);
        (ElectionLedger::new(admin), admin, voter)
    }

    #[test]
    fn only_admin_manages_candidates() {
        let (mut ledger, admin, voter) = setup();
        assert_eq!(
            ledger.add_candidate(voter, draft("Alice")),
            Err(LedgerError::NotAdmin)
        );
        let id = ledger.add_candidate(admin, draft("Alice")).unwrap();
        assert_eq!(ledger.remove_candidate(voter, id), Err(LedgerError::NotAdmin));
        assert_eq!(ledger.end_election(voter), Err(LedgerError::NotAdmin));
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let (mut ledger, admin, _) = setup();
        let first = ledger.add_candidate(admin, draft("Alice")).unwrap();
        ledger.remove_candidate(admin, first).unwrap();
        let second = ledger.add_candidate(admin, draft("Bob")).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn double_vote_is_rejected() {
        let (mut ledger, admin, voter) = setup();
        let id = ledger.add_candidate(admin, draft("Alice")).unwrap();
        ledger.vote(voter, id).unwrap();
        assert_eq!(ledger.vote(voter, id), Err(LedgerError::AlreadyVoted));
        assert_eq!(ledger.candidates()[0].vote_count, 1);
    }

    #[test]
    fn no_votes_after_end() {
        let (mut ledger, admin, voter) = setup();
        let id = ledger.add_candidate(admin, draft("Alice")).unwrap();
        ledger.end_election(admin).unwrap();
        assert_eq!(ledger.vote(voter, id), Err(LedgerError::ElectionEnded));
        assert_eq!(
            ledger.add_candidate(admin, draft("Bob")),
            Err(LedgerError::ElectionEnded)
        );
    }

    #[test]
    fn results_pick_earliest_on_tie() {
        let (mut ledger, admin, _) = setup();
        let alice = ledger.add_candidate(admin, draft("Alice")).unwrap();
        let bob = ledger.add_candidate(admin, draft("Bob")).unwrap();
        ledger.vote(Address::from_low_u64_be(10), bob).unwrap();
        ledger.vote(Address::from_low_u64_be(11), alice).unwrap();

        assert_eq!(ledger.results(), Err(LedgerError::ElectionOngoing));
        ledger.end_election(admin).unwrap();
        let winner = ledger.results().unwrap();
        assert_eq!(winner.name, "Alice");
        assert_eq!(winner.vote_count, 1);
    }

    #[test]
    fn new_election_resets_everything() {
        let (mut ledger, admin, voter) = setup();
        let id = ledger.add_candidate(admin, draft("Alice")).unwrap();
        ledger.vote(voter, id).unwrap();
        ledger.end_election(admin).unwrap();
        ledger.start_new_election(admin).unwrap();

        assert!(!ledger.election_ended());
        assert!(ledger.candidates().is_empty());
        let id = ledger.add_candidate(admin, draft("Bob")).unwrap();
        assert!(ledger.vote(voter, id).is_ok());
    }
}
