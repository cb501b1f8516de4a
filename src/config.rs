use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ethers_core::types::Address;

use crate::contract::DEFAULT_CONTRACT_ADDRESS;

pub struct Config {
    pub port: u16,
    pub rpc_url: Option<String>,
    pub dev_chain: bool,
    pub contract_address: Address,
    pub storage_path: PathBuf,
    pub poll_interval: Duration,
}

#[derive(Debug, thiserror::Error)]
#[error("{key} has an invalid value {value:?}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, falling back to defaults for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let poll_ms: u64 = parse(&lookup, "ELECTION_POLL_INTERVAL_MS", "1000")?;
        let dev_chain = lookup("ELECTION_DEV_CHAIN")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            port: parse(&lookup, "SERVER_PORT", "9095")?,
            rpc_url: lookup("ELECTION_RPC_URL").filter(|url| !url.trim().is_empty()),
            dev_chain,
            contract_address: parse(&lookup, "ELECTION_CONTRACT_ADDRESS", DEFAULT_CONTRACT_ADDRESS)?,
            storage_path: lookup("ELECTION_STORAGE_PATH")
                .unwrap_or_else(|| "local_storage.json".to_string())
                .into(),
            poll_interval: Duration::from_millis(poll_ms.max(1)),
        })
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError> {
    let value = lookup(key).unwrap_or_else(|| {
        log::debug!("{} not set, using default: {}", key, default);
        default.to_string()
    });
    value.trim().parse().map_err(|_| ConfigError { key, value })
}
