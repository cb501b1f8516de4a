use ethers_core::types::Address;
use serde::Serialize;

use crate::contract::ElectionContract;
use crate::models::{Candidate, ElectionStatus, Winner};

/// Client-side copy of what the contract last reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionViewModel {
    pub account: Option<Address>,
    pub is_admin: bool,
    pub election_ended: bool,
    pub candidates: Vec<Candidate>,
    pub winner: Winner,
}

impl ElectionViewModel {
    /// Replaces the candidate snapshot. On failure the previous one is kept.
    pub async fn fetch_candidates(&mut self, contract: &ElectionContract) {
        match contract.get_candidates().await {
            Ok(candidates) => self.candidates = candidates,
            Err(err) => log::error!("Error fetching candidates: {}", err),
        }
    }

    /// Reads the winner, only once the election has ended.
    pub async fn fetch_results(&mut self, contract: &ElectionContract) {
        if !self.election_ended {
            return;
        }
        match contract.get_results().await {
            Ok(winner) => self.winner = winner,
            Err(err) => log::error!("Error fetching results: {}", err),
        }
    }

    pub fn status(&self) -> ElectionStatus {
        ElectionStatus {
            ended: self.election_ended,
            winner: self.winner.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
