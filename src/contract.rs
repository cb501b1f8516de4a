//! Typed binding to the on-chain election contract.

use std::sync::Arc;

use ethers_core::abi::{Abi, Token};
use ethers_core::types::{Address, Bytes, H256, U256};
use thiserror::Error;

use crate::models::{Candidate, CandidateDraft, Winner};
use crate::wallet::{Receipt, WalletError, WalletProvider};

pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

const ELECTION_ABI: &str = include_str!("abi/Election.json");

#[derive(Debug, Error)]
pub enum ContractError {
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error("abi error: {0}")]
    Abi(#[from] ethers_core::abi::Error),
    #[error("invalid interface description: {0}")]
    Interface(#[from] serde_json::Error),
    #[error("unexpected output from {method}()")]
    UnexpectedOutput { method: &'static str },
    #[error("transaction {0:?} failed")]
    Failed(H256),
}

/// The interface description bundled with the client.
pub fn election_abi() -> Result<Abi, ContractError> {
    Ok(serde_json::from_str(ELECTION_ABI)?)
}

/// Converts a contract integer, clamping values that do not fit.
pub fn saturating_u64(value: U256) -> u64 {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.as_u64()
    }
}

/// The contract at a fixed address, with writes signed by `signer`.
pub struct ElectionContract {
    address: Address,
    signer: Address,
    abi: Abi,
    provider: Arc<dyn WalletProvider>,
}

impl ElectionContract {
    pub fn new(
        provider: Arc<dyn WalletProvider>,
        address: Address,
        signer: Address,
    ) -> Result<Self, ContractError> {
        Ok(Self {
            address,
            signer,
            abi: election_abi()?,
            provider,
        })
    }

    pub async fn admin(&self) -> Result<Address, ContractError> {
        let output = self.read("admin", &[]).await?;
        first(output)
            .and_then(Token::into_address)
            .ok_or(ContractError::UnexpectedOutput { method: "admin" })
    }

    pub async fn election_ended(&self) -> Result<bool, ContractError> {
        let output = self.read("electionEnded", &[]).await?;
        first(output)
            .and_then(Token::into_bool)
            .ok_or(ContractError::UnexpectedOutput {
                method: "electionEnded",
            })
    }

    pub async fn get_candidates(&self) -> Result<Vec<Candidate>, ContractError> {
        let output = self.read("getCandidates", &[]).await?;
        let unexpected = ContractError::UnexpectedOutput {
            method: "getCandidates",
        };
        let list = match first(output).and_then(Token::into_array) {
            Some(list) => list,
            None => return Err(unexpected),
        };

        list.into_iter()
            .map(|entry| {
                entry
                    .into_tuple()
                    .and_then(decode_candidate)
                    .ok_or(ContractError::UnexpectedOutput {
                        method: "getCandidates",
                    })
            })
            .collect()
    }

    pub async fn get_results(&self) -> Result<Winner, ContractError> {
        let mut output = self.read("getResults", &[]).await?.into_iter();
        let name = output.next().and_then(Token::into_string);
        let vote_count = output.next().and_then(Token::into_uint);
        match (name, vote_count) {
            (Some(name), Some(vote_count)) => Ok(Winner {
                name,
                vote_count: saturating_u64(vote_count),
            }),
            _ => Err(ContractError::UnexpectedOutput {
                method: "getResults",
            }),
        }
    }

    pub async fn add_candidate(&self, draft: &CandidateDraft) -> Result<Receipt, ContractError> {
        self.write(
            "addCandidate",
            &[
                Token::String(draft.name.clone()),
                Token::String(draft.image.clone()),
                Token::Uint(draft.age.into()),
                Token::String(draft.description.clone()),
            ],
        )
        .await
    }

    pub async fn edit_candidate(
        &self,
        id: u64,
        draft: &CandidateDraft,
    ) -> Result<Receipt, ContractError> {
        self.write(
            "editCandidate",
            &[
                Token::Uint(id.into()),
                Token::String(draft.name.clone()),
                Token::String(draft.image.clone()),
                Token::Uint(draft.age.into()),
                Token::String(draft.description.clone()),
            ],
        )
        .await
    }

    pub async fn remove_candidate(&self, id: u64) -> Result<Receipt, ContractError> {
        self.write("removeCandidate", &[Token::Uint(id.into())]).await
    }

    pub async fn vote(&self, id: u64) -> Result<Receipt, ContractError> {
        self.write("vote", &[Token::Uint(id.into())]).await
    }

    pub async fn end_election(&self) -> Result<Receipt, ContractError> {
        self.write("endElection", &[]).await
    }

    pub async fn start_new_election(&self) -> Result<Receipt, ContractError> {
        self.write("startNewElection", &[]).await
    }

    fn encode(&self, method: &str, args: &[Token]) -> Result<Bytes, ContractError> {
        let function = self.abi.function(method)?;
        Ok(function.encode_input(args)?.into())
    }

    async fn read(&self, method: &'static str, args: &[Token]) -> Result<Vec<Token>, ContractError> {
        let data = self.encode(method, args)?;
        let output = self.provider.call(self.address, data).await?;
        Ok(self.abi.function(method)?.decode_output(&output)?)
    }

    async fn write(&self, method: &'static str, args: &[Token]) -> Result<Receipt, ContractError> {
        let data = self.encode(method, args)?;
        let hash = self
            .provider
            .send_transaction(self.signer, self.address, data)
            .await?;
        log::debug!("Submitted {} as {:?}, waiting for confirmation", method, hash);

        let receipt = self.provider.wait_for_receipt(hash).await?;
        if !receipt.success {
            return Err(ContractError::Failed(hash));
        }
        log::info!("{} confirmed in {:?}", method, hash);
        Ok(receipt)
    }
}

fn first(output: Vec<Token>) -> Option<Token> {
    output.into_iter().next()
}

fn decode_candidate(fields: Vec<Token>) -> Option<Candidate> {
    let mut fields = fields.into_iter();
    Some(Candidate {
        id: saturating_u64(fields.next()?.into_uint()?),
        name: fields.next()?.into_string()?,
        image: fields.next()?.into_string()?,
        age: saturating_u64(fields.next()?.into_uint()?),
        description: fields.next()?.into_string()?,
        vote_count: saturating_u64(fields.next()?.into_uint()?),
    })
}

/// Inverse of the `getCandidates()` tuple layout.
pub fn candidate_token(candidate: &Candidate) -> Token {
    Token::Tuple(vec![
        Token::Uint(candidate.id.into()),
        Token::String(candidate.name.clone()),
        Token::String(candidate.image.clone()),
        Token::Uint(candidate.age.into()),
        Token::String(candidate.description.clone()),
        Token::Uint(candidate.vote_count.into()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_abi_has_every_method() {
        let abi = election_abi().unwrap();
        for method in [
            "admin",
            "electionEnded",
            "getCandidates",
            "getResults",
            "addCandidate",
            "editCandidate",
            "removeCandidate",
            "vote",
            "endElection",
            "startNewElection",
        ] {
            assert!(abi.function(method).is_ok(), "missing {}", method);
        }
    }

    #[test]
    fn candidate_tuple_decodes() {
        let candidate = Candidate {
            id: 7,
            name: "Alice".to_string(),
            image: "https://x/img.png".to_string(),
            age: 40,
            description: "...".to_string(),
            vote_count: 2,
        };
        let fields = candidate_token(&candidate).into_tuple().unwrap();
        assert_eq!(decode_candidate(fields), Some(candidate));
    }

    #[test]
    fn short_tuple_is_rejected() {
        let fields = vec![Token::Uint(1.into()), Token::String("x".to_string())];
        assert_eq!(decode_candidate(fields), None);
    }

    #[test]
    fn huge_counts_saturate() {
        assert_eq!(saturating_u64(U256::MAX), u64::MAX);
        assert_eq!(saturating_u64(U256::from(12u64)), 12);
    }
}
