use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::contract::ContractError;
use crate::storage::StorageError;
use crate::wallet::WalletError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("All fields are required.")]
    MissingFields,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Please log in or register to use the DApp.")]
    NotLoggedIn,

    #[error("Error connecting wallet: {0}")]
    Connect(ContractError),

    #[error("Connect a wallet first")]
    NotConnected,

    #[error("{0}")]
    NotPermitted(&'static str),

    #[error("{0}")]
    InvalidForm(String),

    #[error("No candidate selected for editing")]
    NoSelection,

    #[error("Unknown candidate {0}")]
    UnknownCandidate(u64),

    #[error("Error {action}: {source}")]
    Transaction {
        action: &'static str,
        source: ContractError,
    },

    #[error("Error {0}: the wallet changed before it finished")]
    Abandoned(&'static str),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn transaction(action: &'static str) -> impl FnOnce(ContractError) -> AppError {
        move |source| AppError::Transaction { action, source }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingFields | AppError::InvalidForm(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::NotLoggedIn => StatusCode::UNAUTHORIZED,
            AppError::NotPermitted(_) => StatusCode::FORBIDDEN,
            AppError::UnknownCandidate(_) => StatusCode::NOT_FOUND,
            AppError::NotConnected | AppError::NoSelection | AppError::Abandoned(_) => {
                StatusCode::CONFLICT
            }
            AppError::Connect(ContractError::Wallet(WalletError::ProviderMissing)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Connect(_) | AppError::Transaction { .. } => StatusCode::BAD_GATEWAY,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
