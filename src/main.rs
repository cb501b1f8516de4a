use std::io;
use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use tokio::sync::Mutex;

use election_dapp::app::{spawn_wallet_watcher, ElectionApp};
use election_dapp::config::Config;
use election_dapp::credentials::CredentialStore;
use election_dapp::dev_chain::DevChain;
use election_dapp::routes::{configure, AppState};
use election_dapp::rpc_wallet::RpcWallet;
use election_dapp::session::SessionGate;
use election_dapp::storage::{JsonFileStore, KeyValueStore};
use election_dapp::wallet::WalletProvider;

fn invalid(err: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, err.to_string())
}

type Providers = (Option<Arc<dyn WalletProvider>>, Option<Arc<DevChain>>);

fn wallet_provider(config: &Config) -> io::Result<Providers> {
    if let Some(url) = &config.rpc_url {
        log::info!("Using wallet provider at {}", url);
        let wallet: Arc<dyn WalletProvider> =
            Arc::new(RpcWallet::connect(url, config.poll_interval).map_err(invalid)?);
        return Ok((Some(wallet), None));
    }

    if config.dev_chain {
        let chain = DevChain::with_random_accounts(config.contract_address, 4).map_err(invalid)?;
        log::info!("Using in-process dev chain, admin account {:?}", chain.admin());
        for account in chain.accounts() {
            log::info!("  dev account {:?}", account);
        }
        let chain = Arc::new(chain);
        let provider: Arc<dyn WalletProvider> = chain.clone();
        return Ok((Some(provider), Some(chain)));
    }

    log::warn!("No wallet provider configured, set ELECTION_RPC_URL or ELECTION_DEV_CHAIN=1");
    Ok((None, None))
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(invalid)?;

    let store: Arc<dyn KeyValueStore> =
        Arc::new(JsonFileStore::open(&config.storage_path).map_err(invalid)?);
    let gate = SessionGate::load(store.clone()).map_err(invalid)?;

    let (provider, dev_chain) = wallet_provider(&config)?;
    let election = Arc::new(ElectionApp::new(provider, config.contract_address));
    if gate.current_user().is_some() {
        if let Err(err) = election.connect().await {
            log::warn!("{}", err);
        }
    }

    let subscription = election.subscribe();
    let watcher = subscription.map(|subscription| spawn_wallet_watcher(election.clone(), subscription));

    let state = web::Data::new(AppState {
        gate: Mutex::new(gate),
        credentials: CredentialStore::new(store),
        election,
        dev_chain,
    });

    log::info!("Listening on 127.0.0.1:{}", config.port);
    let result = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind(("127.0.0.1", config.port))?
    .run()
    .await;

    if let Some(watcher) = watcher {
        watcher.abort();
    }
    result
}
