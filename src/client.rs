use std::sync::Arc;

use ethers_core::types::Address;

use crate::contract::{ContractError, ElectionContract};
use crate::wallet::{WalletError, WalletProvider};

/// A wallet connection bound to the election contract.
pub struct ElectionClient {
    contract: Arc<ElectionContract>,
    account: Address,
}

impl ElectionClient {
    /// Requests account access and binds the contract for the first account.
    pub async fn connect(
        provider: Option<Arc<dyn WalletProvider>>,
        contract_address: Address,
    ) -> Result<Self, ContractError> {
        let provider = provider.ok_or(WalletError::ProviderMissing)?;
        let account = provider
            .request_accounts()
            .await?
            .into_iter()
            .next()
            .ok_or(WalletError::NoAccounts)?;
        log::info!("Connected wallet account {:?}", account);

        let contract = ElectionContract::new(provider, contract_address, account)?;
        Ok(Self {
            contract: Arc::new(contract),
            account,
        })
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn contract(&self) -> &Arc<ElectionContract> {
        &self.contract
    }

    /// Whether the connected account is the contract's recorded administrator.
    pub async fn is_admin(&self) -> Result<bool, ContractError> {
        let admin = self.contract.admin().await?;
        Ok(is_same_account(admin, self.account))
    }
}

/// Parsed addresses compare byte-wise, so hex casing never matters.
pub fn is_same_account(a: Address, b: Address) -> bool {
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn checksum_and_lowercase_forms_match() {
        let checksummed = Address::from_str("0x5FbDB2315678afecb367f032d93F642f64180aa3").unwrap();
        let lower = Address::from_str("0x5fbdb2315678afecb367f032d93f642f64180aa3").unwrap();
        assert!(is_same_account(checksummed, lower));
    }

    #[tokio::test]
    async fn missing_provider_is_reported() {
        let err = ElectionClient::connect(None, Address::zero()).await.err().unwrap();
        assert!(matches!(
            err,
            ContractError::Wallet(WalletError::ProviderMissing)
        ));
    }
}
