//! An in-process chain hosting one election contract, for local runs and tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use ethers_core::abi::{self, Abi, Function, Token};
use ethers_core::types::{Address, Bytes, H256};
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;

use crate::contract::{candidate_token, election_abi, saturating_u64, ContractError};
use crate::ledger::{ElectionLedger, LedgerError};
use crate::models::{Candidate, CandidateDraft};
use crate::wallet::{publish, Receipt, Subscription, WalletError, WalletEvent, WalletProvider};

pub const DEV_CHAIN_ID: u64 = 31337;

struct ChainState {
    ledger: ElectionLedger,
    accounts: Vec<Address>,
    chain_id: u64,
    nonce: u64,
    receipts: HashMap<H256, Receipt>,
}

pub struct DevChain {
    contract: Address,
    abi: Abi,
    state: Mutex<ChainState>,
    events: broadcast::Sender<WalletEvent>,
}

impl DevChain {
    /// Deploys the contract at `contract` with `accounts[0]` as admin.
    pub fn new(contract: Address, accounts: Vec<Address>) -> Result<Self, ContractError> {
        let admin = accounts
            .first()
            .copied()
            .ok_or(WalletError::NoAccounts)?;
        let (events, _) = broadcast::channel(16);

        Ok(Self {
            contract,
            abi: election_abi()?,
            state: Mutex::new(ChainState {
                ledger: ElectionLedger::new(admin),
                accounts,
                chain_id: DEV_CHAIN_ID,
                nonce: 0,
                receipts: HashMap::new(),
            }),
            events,
        })
    }

    /// Same as `new`, with `count` freshly generated accounts.
    pub fn with_random_accounts(contract: Address, count: usize) -> Result<Self, ContractError> {
        let accounts = (0..count.max(1))
            .map(|_| Address::from(rand::random::<[u8; 20]>()))
            .collect();
        Self::new(contract, accounts)
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn admin(&self) -> Address {
        self.lock().ledger.admin()
    }

    /// Known accounts, the active one first.
    pub fn accounts(&self) -> Vec<Address> {
        self.lock().accounts.clone()
    }

    pub fn candidates(&self) -> Vec<Candidate> {
        self.lock().ledger.candidates().to_vec()
    }

    pub fn election_ended(&self) -> bool {
        self.lock().ledger.election_ended()
    }

    /// Makes `account` the active one, adding it if unknown.
    pub fn switch_account(&self, account: Address) {
        let accounts = {
            let mut state = self.lock();
            state.accounts.retain(|a| *a != account);
            state.accounts.insert(0, account);
            state.accounts.clone()
        };
        log::info!("Dev chain switched active account to {:?}", account);
        publish(&self.events, WalletEvent::AccountsChanged(accounts));
    }

    pub fn switch_chain(&self, chain_id: u64) {
        self.lock().chain_id = chain_id;
        publish(&self.events, WalletEvent::ChainChanged(chain_id));
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        // mutations never leave the state half-written
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn function_for(&self, data: &[u8]) -> Result<&Function, WalletError> {
        if data.len() < 4 {
            return Err(WalletError::Reverted("missing function selector".to_string()));
        }
        self.abi
            .functions()
            .find(|f| f.short_signature() == data[..4])
            .ok_or_else(|| WalletError::Reverted("unknown function selector".to_string()))
    }

    fn execute(
        &self,
        ledger: &mut ElectionLedger,
        caller: Address,
        data: &[u8],
    ) -> Result<Vec<Token>, WalletError> {
        let function = self.function_for(data)?;
        let args = function
            .decode_input(&data[4..])
            .map_err(|e| WalletError::Reverted(format!("malformed calldata: {}", e)))?;

        dispatch(ledger, caller, &function.name, args).map_err(|err| match err {
            Dispatch::Ledger(err) => WalletError::Reverted(err.to_string()),
            Dispatch::BadArguments => {
                WalletError::Reverted(format!("bad arguments for {}", function.name))
            }
        })
    }
}

enum Dispatch {
    Ledger(LedgerError),
    BadArguments,
}

impl From<LedgerError> for Dispatch {
    fn from(err: LedgerError) -> Self {
        Dispatch::Ledger(err)
    }
}

fn dispatch(
    ledger: &mut ElectionLedger,
    caller: Address,
    method: &str,
    args: Vec<Token>,
) -> Result<Vec<Token>, Dispatch> {
    let mut args = args.into_iter();

    match method {
        "admin" => Ok(vec![Token::Address(ledger.admin())]),
        "electionEnded" => Ok(vec![Token::Bool(ledger.election_ended())]),
        "getCandidates" => Ok(vec![Token::Array(
            ledger.candidates().iter().map(candidate_token).collect(),
        )]),
        "getResults" => {
            let winner = ledger.results()?;
            Ok(vec![
                Token::String(winner.name),
                Token::Uint(winner.vote_count.into()),
            ])
        }
        "removeCandidate" => {
            let id = next_uint(&mut args)?;
            ledger.remove_candidate(caller, id)?;
            Ok(vec![])
        }
        "vote" => {
            let id = next_uint(&mut args)?;
            ledger.vote(caller, id)?;
            Ok(vec![])
        }
        "endElection" => {
            ledger.end_election(caller)?;
            Ok(vec![])
        }
        "startNewElection" => {
            ledger.start_new_election(caller)?;
            Ok(vec![])
        }
        "addCandidate" => {
            let draft = draft_from(&mut args)?;
            ledger.add_candidate(caller, draft)?;
            Ok(vec![])
        }
        "editCandidate" => {
            let id = next_uint(&mut args)?;
            let draft = draft_from(&mut args)?;
            ledger.edit_candidate(caller, id, draft)?;
            Ok(vec![])
        }
        _ => Err(Dispatch::BadArguments),
    }
}

fn next_uint(args: &mut impl Iterator<Item = Token>) -> Result<u64, Dispatch> {
    args.next()
        .and_then(Token::into_uint)
        .map(saturating_u64)
        .ok_or(Dispatch::BadArguments)
}

fn next_string(args: &mut impl Iterator<Item = Token>) -> Result<String, Dispatch> {
    args.next()
        .and_then(Token::into_string)
        .ok_or(Dispatch::BadArguments)
}

fn draft_from(args: &mut impl Iterator<Item = Token>) -> Result<CandidateDraft, Dispatch> {
    let name = next_string(args)?;
    let image = next_string(args)?;
    let age = next_uint(args)?;
    let description = next_string(args)?;
    Ok(CandidateDraft {
        name,
        image,
        age,
        description,
    })
}

fn transaction_hash(from: Address, nonce: u64, data: &[u8]) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(from.as_bytes());
    hasher.update(nonce.to_be_bytes());
    hasher.update(data);
    H256::from_slice(&hasher.finalize())
}

#[async_trait]
impl WalletProvider for DevChain {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        Ok(self.accounts())
    }

    async fn chain_id(&self) -> Result<u64, WalletError> {
        Ok(self.lock().chain_id)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, WalletError> {
        if to != self.contract {
            return Ok(Bytes::default());
        }
        let (mut scratch, caller) = {
            let state = self.lock();
            (state.ledger.clone(), state.accounts.first().copied().unwrap_or_default())
        };
        let output = self.execute(&mut scratch, caller, &data)?;
        Ok(abi::encode(&output).into())
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<H256, WalletError> {
        if to != self.contract {
            return Err(WalletError::Rpc(format!("no contract deployed at {:?}", to)));
        }

        let mut state = self.lock();
        if !state.accounts.contains(&from) {
            return Err(WalletError::Rpc(format!("unknown account {:?}", from)));
        }

        let mut ledger = state.ledger.clone();
        self.execute(&mut ledger, from, &data)?;
        state.ledger = ledger;

        state.nonce += 1;
        let hash = transaction_hash(from, state.nonce, &data);
        state.receipts.insert(
            hash,
            Receipt {
                transaction_hash: hash,
                success: true,
            },
        );
        log::debug!("Dev chain mined {:?}", hash);
        Ok(hash)
    }

    async fn wait_for_receipt(&self, transaction_hash: H256) -> Result<Receipt, WalletError> {
        self.lock()
            .receipts
            .get(&transaction_hash)
            .cloned()
            .ok_or_else(|| WalletError::Rpc(format!("unknown transaction {:?}", transaction_hash)))
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.events.subscribe(), None)
    }
}
