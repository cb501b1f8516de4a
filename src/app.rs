//! The admin/voter panel: explicit application state plus the write path.

use std::future::Future;
use std::sync::Arc;

use ethers_core::types::Address;
use serde::Serialize;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::client::ElectionClient;
use crate::contract::{ContractError, ElectionContract};
use crate::error::AppError;
use crate::models::{Candidate, CandidateForm, Winner};
use crate::view_model::ElectionViewModel;
use crate::wallet::{Receipt, Subscription, WalletProvider};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "camelCase")]
pub enum Outcome {
    Done(&'static str),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Affordances {
    pub manage_candidates: bool,
    pub vote: bool,
    pub end_election: bool,
    pub start_new_election: bool,
}

/// Everything the panel renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelSnapshot {
    pub connected: bool,
    pub account: Option<Address>,
    pub admin_mode: bool,
    pub election_ended: bool,
    pub candidates: Vec<Candidate>,
    pub results: Option<Winner>,
    pub form: CandidateForm,
    pub editing: Option<u64>,
    pub actions: Affordances,
}

#[derive(Default)]
struct PanelState {
    client: Option<ElectionClient>,
    view: ElectionViewModel,
    form: CandidateForm,
    editing: Option<u64>,
}

impl PanelState {
    fn contract(&self) -> Result<Arc<ElectionContract>, AppError> {
        self.client
            .as_ref()
            .map(|client| client.contract().clone())
            .ok_or(AppError::NotConnected)
    }

    fn require_admin(&self, message: &'static str) -> Result<(), AppError> {
        if self.client.is_none() {
            return Err(AppError::NotConnected);
        }
        if !self.view.is_admin {
            return Err(AppError::NotPermitted(message));
        }
        Ok(())
    }

    fn require_open(&self) -> Result<(), AppError> {
        if self.view.election_ended {
            return Err(AppError::NotPermitted("The election has ended"));
        }
        Ok(())
    }

    fn snapshot(&self) -> PanelSnapshot {
        let connected = self.client.is_some();
        let status = self.view.status();
        let admin = connected && self.view.is_admin;
        let open = connected && !status.ended;

        PanelSnapshot {
            connected,
            account: self.view.account,
            admin_mode: admin,
            election_ended: status.ended,
            candidates: self.view.candidates.clone(),
            results: status.ended.then_some(status.winner),
            form: self.form.clone(),
            editing: self.editing,
            actions: Affordances {
                manage_candidates: admin && open,
                vote: open && !admin,
                end_election: admin && open,
                start_new_election: admin && status.ended,
            },
        }
    }
}

/// Panel state shared by every request. Transactions are awaited without the
/// state lock held, so a wallet change can always reset the panel.
pub struct ElectionApp {
    provider: Option<Arc<dyn WalletProvider>>,
    contract_address: Address,
    state: Mutex<PanelState>,
    /// Bumped by `reset`. Work started under an older value is abandoned.
    generation: watch::Sender<u64>,
}

impl ElectionApp {
    pub fn new(provider: Option<Arc<dyn WalletProvider>>, contract_address: Address) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            provider,
            contract_address,
            state: Mutex::new(PanelState::default()),
            generation,
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.client.is_some()
    }

    pub async fn view(&self) -> ElectionViewModel {
        self.state.lock().await.view.clone()
    }

    pub async fn form(&self) -> CandidateForm {
        self.state.lock().await.form.clone()
    }

    pub async fn editing(&self) -> Option<u64> {
        self.state.lock().await.editing
    }

    /// Connects the wallet and loads the whole view model from the contract.
    pub async fn connect(&self) -> Result<(), AppError> {
        let generation = self.generation.subscribe();
        let client = ElectionClient::connect(self.provider.clone(), self.contract_address)
            .await
            .map_err(AppError::Connect)?;
        let is_admin = client.is_admin().await.map_err(AppError::Connect)?;
        let election_ended = client
            .contract()
            .election_ended()
            .await
            .map_err(AppError::Connect)?;

        let mut view = ElectionViewModel {
            account: Some(client.account()),
            is_admin,
            election_ended,
            ..ElectionViewModel::default()
        };
        view.fetch_candidates(client.contract()).await;
        view.fetch_results(client.contract()).await;
        if is_admin {
            log::info!("{:?} is the election admin", client.account());
        }

        let mut state = self
            .resume(&generation)
            .await
            .ok_or(AppError::Abandoned("connecting wallet"))?;
        state.view = view;
        state.client = Some(client);
        Ok(())
    }

    /// Wallet events for the configured provider, if there is one.
    pub fn subscribe(&self) -> Option<Subscription> {
        self.provider.as_ref().map(|provider| provider.subscribe())
    }

    /// Drops the connection and every cached contract read, and abandons
    /// writes still waiting for confirmation.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        *state = PanelState::default();
        self.generation.send_modify(|generation| *generation += 1);
    }

    pub async fn start_editing(&self, id: u64) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        state.require_admin("Only the admin can edit candidates")?;
        state.require_open()?;
        let form = state
            .view
            .candidates
            .iter()
            .find(|c| c.id == id)
            .map(CandidateForm::from_candidate)
            .ok_or(AppError::UnknownCandidate(id))?;
        state.form = form;
        state.editing = Some(id);
        Ok(())
    }

    pub async fn cancel_editing(&self) {
        let mut state = self.state.lock().await;
        state.editing = None;
        state.form = CandidateForm::default();
    }

    pub async fn add_candidate(&self, form: CandidateForm) -> Result<Outcome, AppError> {
        let (contract, draft, mut generation) = {
            let (mut state, generation) = self.begin().await;
            state.require_admin("Only the admin can add candidates")?;
            state.require_open()?;
            state.form = form;
            let draft = state.form.validate().map_err(AppError::InvalidForm)?;
            (state.contract()?, draft, generation)
        };
        submit(&mut generation, "adding candidate", contract.add_candidate(&draft)).await?;

        if let Some(mut state) = self.resume(&generation).await {
            state.form = CandidateForm::default();
            state.view.fetch_candidates(&contract).await;
        }
        Ok(Outcome::Done("Candidate added successfully!"))
    }

    /// Submits the form for the candidate selected with `start_editing`.
    pub async fn edit_candidate(&self, form: CandidateForm) -> Result<Outcome, AppError> {
        let (contract, id, draft, mut generation) = {
            let (mut state, generation) = self.begin().await;
            state.require_admin("Only the admin can edit candidates")?;
            state.require_open()?;
            let id = state.editing.ok_or(AppError::NoSelection)?;
            state.form = form;
            let draft = state.form.validate().map_err(AppError::InvalidForm)?;
            (state.contract()?, id, draft, generation)
        };
        submit(
            &mut generation,
            "editing candidate",
            contract.edit_candidate(id, &draft),
        )
        .await?;

        if let Some(mut state) = self.resume(&generation).await {
            state.editing = None;
            state.form = CandidateForm::default();
            state.view.fetch_candidates(&contract).await;
        }
        Ok(Outcome::Done("Candidate edited successfully!"))
    }

    pub async fn remove_candidate(&self, id: u64, confirmed: bool) -> Result<Outcome, AppError> {
        let (contract, mut generation) = {
            let (state, generation) = self.begin().await;
            state.require_admin("Only the admin can remove candidates")?;
            state.require_open()?;
            if !confirmed {
                return Ok(Outcome::Cancelled);
            }
            (state.contract()?, generation)
        };
        submit(&mut generation, "removing candidate", contract.remove_candidate(id)).await?;

        if let Some(mut state) = self.resume(&generation).await {
            if state.editing == Some(id) {
                state.editing = None;
                state.form = CandidateForm::default();
            }
            state.view.fetch_candidates(&contract).await;
        }
        Ok(Outcome::Done("Candidate removed successfully!"))
    }

    pub async fn vote(&self, id: u64) -> Result<Outcome, AppError> {
        let (contract, mut generation) = {
            let (state, generation) = self.begin().await;
            state.require_open()?;
            if state.view.is_admin {
                return Err(AppError::NotPermitted("The admin cannot vote"));
            }
            (state.contract()?, generation)
        };
        submit(&mut generation, "voting", contract.vote(id)).await?;

        if let Some(mut state) = self.resume(&generation).await {
            state.view.fetch_candidates(&contract).await;
        }
        Ok(Outcome::Done("Vote successful!"))
    }

    pub async fn end_election(&self, confirmed: bool) -> Result<Outcome, AppError> {
        let (contract, mut generation) = {
            let (state, generation) = self.begin().await;
            state.require_admin("Only the admin can end the election")?;
            state.require_open()?;
            if !confirmed {
                return Ok(Outcome::Cancelled);
            }
            (state.contract()?, generation)
        };
        submit(&mut generation, "ending election", contract.end_election()).await?;

        if let Some(mut state) = self.resume(&generation).await {
            state.view.election_ended = true;
            state.view.fetch_results(&contract).await;
        }
        Ok(Outcome::Done("Election ended successfully!"))
    }

    /// Resets the contract's candidates and reopens voting.
    pub async fn start_new_election(&self, confirmed: bool) -> Result<Outcome, AppError> {
        let (contract, mut generation) = {
            let (state, generation) = self.begin().await;
            state.require_admin("Only the admin can start a new election")?;
            if !state.view.election_ended {
                return Err(AppError::NotPermitted("The election is still ongoing"));
            }
            if !confirmed {
                return Ok(Outcome::Cancelled);
            }
            (state.contract()?, generation)
        };
        submit(
            &mut generation,
            "starting new election",
            contract.start_new_election(),
        )
        .await?;

        if let Some(mut state) = self.resume(&generation).await {
            state.view.election_ended = false;
            state.view.winner = Winner::default();
            state.view.fetch_candidates(&contract).await;
        }
        Ok(Outcome::Done("New election started!"))
    }

    pub async fn snapshot(&self) -> PanelSnapshot {
        self.state.lock().await.snapshot()
    }

    async fn begin(&self) -> (MutexGuard<'_, PanelState>, watch::Receiver<u64>) {
        let state = self.state.lock().await;
        (state, self.generation.subscribe())
    }

    /// The state lock again, unless a reset happened since `generation` was taken.
    async fn resume(&self, generation: &watch::Receiver<u64>) -> Option<MutexGuard<'_, PanelState>> {
        let state = self.state.lock().await;
        match generation.has_changed() {
            Ok(false) => Some(state),
            _ => None,
        }
    }
}

/// Waits for a write to be confirmed, giving up as soon as the panel is reset.
async fn submit(
    generation: &mut watch::Receiver<u64>,
    action: &'static str,
    write: impl Future<Output = Result<Receipt, ContractError>>,
) -> Result<(), AppError> {
    tokio::select! {
        result = write => result.map(drop).map_err(AppError::transaction(action)),
        _ = generation.changed() => {
            log::warn!("Abandoned {} after a wallet change", action);
            Err(AppError::Abandoned(action))
        }
    }
}

/// Resets and reconnects the app on every wallet account or network change.
/// Stops when the subscription closes or the returned task is aborted.
pub fn spawn_wallet_watcher(app: Arc<ElectionApp>, mut subscription: Subscription) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = subscription.next().await {
            log::info!("Wallet event {:?}, resetting election state", event);
            app.reset().await;
            if let Err(err) = app.connect().await {
                log::warn!("Reconnect after wallet change failed: {}", err);
            }
        }
        log::debug!("Wallet subscription closed");
    })
}
