//! The signing provider the election client talks through.

use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, H256};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("no wallet provider available, install a wallet or set ELECTION_RPC_URL")]
    ProviderMissing,
    #[error("wallet returned no accounts")]
    NoAccounts,
    #[error("execution reverted: {0}")]
    Reverted(String),
    #[error("rpc error: {0}")]
    Rpc(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

/// Broadcasts `event`; with nobody subscribed it is dropped.
pub fn publish(events: &broadcast::Sender<WalletEvent>, event: WalletEvent) {
    if let Err(unsent) = events.send(event) {
        log::debug!("No subscribers for wallet event {:?}", unsent.0);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: H256,
    pub success: bool,
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Asks the wallet for access; the first account is the active one.
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError>;

    async fn chain_id(&self) -> Result<u64, WalletError>;

    /// Read-only call, returns the raw ABI-encoded output.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, WalletError>;

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<H256, WalletError>;

    /// Resolves once the transaction is mined. There is no timeout.
    async fn wait_for_receipt(&self, transaction_hash: H256) -> Result<Receipt, WalletError>;

    fn subscribe(&self) -> Subscription;
}

/// Stream of wallet events. Dropping it (or calling `unsubscribe`) stops any
/// background poller feeding it.
pub struct Subscription {
    events: broadcast::Receiver<WalletEvent>,
    poller: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(events: broadcast::Receiver<WalletEvent>, poller: Option<JoinHandle<()>>) -> Self {
        Self { events, poller }
    }

    /// Next event, or `None` once the provider went away.
    pub async fn next(&mut self) -> Option<WalletEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Missed {} wallet events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {
        drop(self)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_without_subscribers_are_dropped() {
        let (events, receiver) = broadcast::channel(4);
        drop(receiver);
        publish(&events, WalletEvent::ChainChanged(1));

        let mut subscription = Subscription::new(events.subscribe(), None);
        publish(&events, WalletEvent::ChainChanged(2));
        assert_eq!(subscription.next().await, Some(WalletEvent::ChainChanged(2)));
    }
}
