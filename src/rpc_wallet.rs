//! Wallet provider speaking Ethereum JSON-RPC over HTTP.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, H256, U64};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::Error as RpcError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;

use crate::wallet::{publish, Receipt, Subscription, WalletError, WalletEvent, WalletProvider};

const METHOD_NOT_FOUND: i32 = -32601;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: H256,
    status: Option<U64>,
}

pub struct RpcWallet {
    url: String,
    client: Arc<HttpClient>,
    poll_interval: Duration,
}

impl RpcWallet {
    pub fn connect(url: &str, poll_interval: Duration) -> Result<Self, WalletError> {
        let client = HttpClientBuilder::default()
            .build(url)
            .map_err(|e| WalletError::Rpc(format!("invalid rpc url {}: {}", url, e)))?;

        Ok(Self {
            url: url.to_string(),
            client: Arc::new(client),
            poll_interval,
        })
    }
}

fn rpc_error(err: RpcError) -> WalletError {
    match err {
        RpcError::Call(call) if call.message().contains("revert") => {
            WalletError::Reverted(call.message().to_string())
        }
        other => WalletError::Rpc(other.to_string()),
    }
}

async fn accounts(client: &HttpClient) -> Result<Vec<Address>, WalletError> {
    client
        .request("eth_accounts", rpc_params![])
        .await
        .map_err(rpc_error)
}

async fn chain_id(client: &HttpClient) -> Result<u64, WalletError> {
    let id: U64 = client
        .request("eth_chainId", rpc_params![])
        .await
        .map_err(rpc_error)?;
    Ok(id.as_u64())
}

/// Polls the endpoint and broadcasts account and chain changes until aborted.
async fn watch(
    client: Arc<HttpClient>,
    events: broadcast::Sender<WalletEvent>,
    poll_interval: Duration,
) {
    let mut last_accounts = accounts(&client).await.ok();
    let mut last_chain = chain_id(&client).await.ok();
    let mut ticker = tokio::time::interval(poll_interval);

    loop {
        ticker.tick().await;

        match accounts(&client).await {
            Ok(current) if last_accounts.as_ref() != Some(&current) => {
                if last_accounts.is_some() {
                    log::info!("Wallet accounts changed");
                    publish(&events, WalletEvent::AccountsChanged(current.clone()));
                }
                last_accounts = Some(current);
            }
            Ok(_) => {}
            Err(err) => log::debug!("Polling eth_accounts failed: {}", err),
        }

        match chain_id(&client).await {
            Ok(current) if last_chain != Some(current) => {
                if last_chain.is_some() {
                    log::info!("Wallet switched to chain {}", current);
                    publish(&events, WalletEvent::ChainChanged(current));
                }
                last_chain = Some(current);
            }
            Ok(_) => {}
            Err(err) => log::debug!("Polling eth_chainId failed: {}", err),
        }
    }
}

#[async_trait]
impl WalletProvider for RpcWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        let requested: Result<Vec<Address>, RpcError> = self
            .client
            .request("eth_requestAccounts", rpc_params![])
            .await;

        match requested {
            Ok(accounts) => Ok(accounts),
            Err(RpcError::Call(call)) if call.code() == METHOD_NOT_FOUND => {
                log::debug!("{} has no eth_requestAccounts, using eth_accounts", self.url);
                accounts(&self.client).await
            }
            Err(err) => Err(rpc_error(err)),
        }
    }

    async fn chain_id(&self) -> Result<u64, WalletError> {
        chain_id(&self.client).await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, WalletError> {
        let request = json!({ "to": to, "data": data });
        self.client
            .request("eth_call", rpc_params![request, "latest"])
            .await
            .map_err(rpc_error)
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<H256, WalletError> {
        let request = json!({ "from": from, "to": to, "data": data });
        self.client
            .request("eth_sendTransaction", rpc_params![request])
            .await
            .map_err(rpc_error)
    }

    async fn wait_for_receipt(&self, transaction_hash: H256) -> Result<Receipt, WalletError> {
        loop {
            let receipt: Option<RpcReceipt> = self
                .client
                .request("eth_getTransactionReceipt", rpc_params![transaction_hash])
                .await
                .map_err(rpc_error)?;

            if let Some(receipt) = receipt {
                return Ok(Receipt {
                    transaction_hash: receipt.transaction_hash,
                    success: receipt.status.map_or(true, |status| status == U64::one()),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn subscribe(&self) -> Subscription {
        let (events, receiver) = broadcast::channel(16);
        let poller = tokio::spawn(watch(self.client.clone(), events, self.poll_interval));
        Subscription::new(receiver, Some(poller))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use jsonrpsee::server::{RpcModule, ServerBuilder, ServerHandle};
    use jsonrpsee::types::ErrorObjectOwned;
    use serde_json::Value;

    use super::*;
    use crate::contract::{ContractError, ElectionContract};

    const POLL: Duration = Duration::from_millis(10);

    #[derive(Default)]
    struct Node {
        accounts: Mutex<Vec<Address>>,
        receipt_polls: AtomicUsize,
    }

    type Module = RpcModule<Arc<Node>>;

    fn node(accounts: Vec<Address>) -> (Arc<Node>, Module) {
        let node = Arc::new(Node {
            accounts: Mutex::new(accounts),
            ..Node::default()
        });
        let mut module = RpcModule::new(node.clone());
        module
            .register_method("eth_accounts", |_, node| {
                Ok::<_, ErrorObjectOwned>(node.accounts.lock().unwrap().clone())
            })
            .unwrap();
        module
            .register_method("eth_chainId", |_, _| {
                Ok::<_, ErrorObjectOwned>(U64::from(31337u64))
            })
            .unwrap();
        (node, module)
    }

    async fn serve(module: Module) -> (ServerHandle, RpcWallet) {
        let server = ServerBuilder::default().build("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let wallet = RpcWallet::connect(&format!("http://{}", addr), POLL).unwrap();
        (server.start(module), wallet)
    }

    #[tokio::test]
    async fn request_accounts_falls_back_to_eth_accounts() {
        let account = Address::from_low_u64_be(7);
        let (_, module) = node(vec![account]);
        let (_server, wallet) = serve(module).await;

        assert_eq!(wallet.request_accounts().await.unwrap(), vec![account]);
        assert_eq!(wallet.chain_id().await.unwrap(), 31337);

        let err = wallet
            .send_transaction(account, Address::zero(), Bytes::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Rpc(_)));
    }

    #[tokio::test]
    async fn revert_reason_is_kept() {
        let (_, mut module) = node(vec![Address::from_low_u64_be(7)]);
        module
            .register_method("eth_sendTransaction", |_, _| {
                Err::<H256, _>(ErrorObjectOwned::owned(
                    3,
                    "execution reverted: You have already voted",
                    None::<()>,
                ))
            })
            .unwrap();
        let (_server, wallet) = serve(module).await;

        let err = wallet
            .send_transaction(Address::from_low_u64_be(7), Address::zero(), Bytes::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Reverted(reason) if reason.contains("already voted")));
    }

    #[tokio::test]
    async fn failed_receipt_fails_the_write() {
        let signer = Address::from_low_u64_be(7);
        let hash = H256::repeat_byte(0xaa);
        let (node, mut module) = node(vec![signer]);
        module
            .register_method("eth_sendTransaction", move |_, _| {
                Ok::<_, ErrorObjectOwned>(hash)
            })
            .unwrap();
        module
            .register_method("eth_getTransactionReceipt", move |_, node| {
                if node.receipt_polls.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Ok::<_, ErrorObjectOwned>(Value::Null);
                }
                Ok(json!({ "transactionHash": hash, "status": "0x0" }))
            })
            .unwrap();
        let (_server, wallet) = serve(module).await;

        let contract =
            ElectionContract::new(Arc::new(wallet), Address::from_low_u64_be(0xE1), signer)
                .unwrap();
        let err = contract.vote(1).await.unwrap_err();
        assert!(matches!(err, ContractError::Failed(failed) if failed == hash));
        assert_eq!(node.receipt_polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn account_switch_is_broadcast() {
        let first = Address::from_low_u64_be(7);
        let second = Address::from_low_u64_be(8);
        let (node, module) = node(vec![first]);
        let (_server, wallet) = serve(module).await;

        let mut events = wallet.subscribe();
        tokio::time::sleep(POLL * 5).await;
        *node.accounts.lock().unwrap() = vec![second, first];

        let event = tokio::time::timeout(Duration::from_secs(2), events.next())
            .await
            .unwrap();
        assert_eq!(event, Some(WalletEvent::AccountsChanged(vec![second, first])));
    }

    #[test]
    fn receipt_status_parses() {
        let raw = json!({
            "transactionHash": "0x00000000000000000000000000000000000000000000000000000000000000aa",
            "status": "0x0",
            "blockNumber": "0x2"
        });
        let receipt: RpcReceipt = serde_json::from_value(raw).unwrap();
        assert_eq!(receipt.status, Some(U64::zero()));
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(RpcWallet::connect("not a url", Duration::from_millis(10)).is_err());
    }
}
