//! Client for an on-chain election contract.
//!
//! A local username/password gate sits in front of the application. Once a
//! user is logged in, the client connects a wallet provider, binds the
//! election contract and mirrors its state in a view model. Admin accounts
//! manage candidates and the election lifecycle; everyone else votes. Every
//! write is followed by a full re-read of the affected contract state.

pub mod app;
pub mod client;
pub mod config;
pub mod contract;
pub mod credentials;
pub mod dev_chain;
pub mod error;
pub mod ledger;
pub mod models;
pub mod routes;
pub mod rpc_wallet;
pub mod session;
pub mod storage;
pub mod view_model;
pub mod wallet;
