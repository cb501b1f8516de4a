use std::sync::Arc;

use actix_web::{web, HttpResponse};
use ethers_core::types::Address;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::app::ElectionApp;
use crate::credentials::CredentialStore;
use crate::dev_chain::DevChain;
use crate::error::AppError;
use crate::models::CandidateForm;
use crate::session::SessionGate;

pub struct AppState {
    pub gate: Mutex<SessionGate>,
    pub credentials: CredentialStore,
    pub election: Arc<ElectionApp>,
    /// Present when running against the in-process chain.
    pub dev_chain: Option<Arc<DevChain>>,
}

#[derive(Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Deserialize)]
pub struct SwitchAccountRequest {
    pub account: Address,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/session", web::get().to(get_session))
        .route("/session/show-login", web::post().to(show_login))
        .route("/session/show-register", web::post().to(show_register))
        .route("/register", web::post().to(register))
        .route("/login", web::post().to(login))
        .route("/logout", web::post().to(logout))
        .route("/wallet/connect", web::post().to(connect_wallet))
        .route("/election", web::get().to(get_election))
        .route("/election/end", web::post().to(end_election))
        .route("/election/restart", web::post().to(start_new_election))
        .route("/candidates", web::post().to(add_candidate))
        .route("/candidates", web::put().to(edit_candidate))
        .route("/candidates/edit/cancel", web::post().to(cancel_editing))
        .route("/candidates/{id}/edit", web::post().to(start_editing))
        .route("/candidates/{id}/vote", web::post().to(vote))
        .route("/candidates/{id}", web::delete().to(remove_candidate))
        .route("/dev/accounts", web::get().to(dev_accounts))
        .route("/dev/switch-account", web::post().to(dev_switch_account));
}

async fn require_user(data: &AppState) -> Result<String, AppError> {
    data.gate
        .lock()
        .await
        .current_user()
        .map(str::to_string)
        .ok_or(AppError::NotLoggedIn)
}

async fn get_session(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.gate.lock().await.view())
}

async fn show_login(data: web::Data<AppState>) -> HttpResponse {
    let mut gate = data.gate.lock().await;
    gate.show_login();
    HttpResponse::Ok().json(gate.view())
}

async fn show_register(data: web::Data<AppState>) -> HttpResponse {
    let mut gate = data.gate.lock().await;
    gate.show_register();
    HttpResponse::Ok().json(gate.view())
}

async fn register(
    data: web::Data<AppState>,
    body: web::Json<CredentialsRequest>,
) -> Result<HttpResponse, AppError> {
    let notice = data.credentials.register(&body.name, &body.password)?;
    Ok(HttpResponse::Ok().json(json!({ "message": notice })))
}

async fn login(
    data: web::Data<AppState>,
    body: web::Json<CredentialsRequest>,
) -> Result<HttpResponse, AppError> {
    data.credentials.login(&body.name, &body.password)?;
    let view = {
        let mut gate = data.gate.lock().await;
        gate.login(&body.name)?;
        gate.view()
    };
    log::info!("{} logged in", body.name);

    if !data.election.is_connected().await {
        if let Err(err) = data.election.connect().await {
            log::warn!("{}", err);
        }
    }
    Ok(HttpResponse::Ok().json(view))
}

async fn logout(data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let view = {
        let mut gate = data.gate.lock().await;
        gate.logout()?;
        gate.view()
    };
    data.election.reset().await;
    Ok(HttpResponse::Ok().json(view))
}

async fn connect_wallet(data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    require_user(&data).await?;
    data.election.connect().await?;
    Ok(HttpResponse::Ok().json(data.election.snapshot().await))
}

async fn get_election(data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    require_user(&data).await?;
    Ok(HttpResponse::Ok().json(data.election.snapshot().await))
}

async fn add_candidate(
    data: web::Data<AppState>,
    form: web::Json<CandidateForm>,
) -> Result<HttpResponse, AppError> {
    require_user(&data).await?;
    let outcome = data.election.add_candidate(form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

async fn start_editing(
    data: web::Data<AppState>,
    id: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    require_user(&data).await?;
    data.election.start_editing(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(data.election.snapshot().await))
}

async fn cancel_editing(data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    require_user(&data).await?;
    data.election.cancel_editing().await;
    Ok(HttpResponse::Ok().json(data.election.snapshot().await))
}

async fn edit_candidate(
    data: web::Data<AppState>,
    form: web::Json<CandidateForm>,
) -> Result<HttpResponse, AppError> {
    require_user(&data).await?;
    let outcome = data.election.edit_candidate(form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

async fn remove_candidate(
    data: web::Data<AppState>,
    id: web::Path<u64>,
    query: web::Query<ConfirmRequest>,
) -> Result<HttpResponse, AppError> {
    require_user(&data).await?;
    let outcome = data
        .election
        .remove_candidate(id.into_inner(), query.confirm)
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

async fn vote(data: web::Data<AppState>, id: web::Path<u64>) -> Result<HttpResponse, AppError> {
    require_user(&data).await?;
    let outcome = data.election.vote(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

async fn end_election(
    data: web::Data<AppState>,
    body: web::Json<ConfirmRequest>,
) -> Result<HttpResponse, AppError> {
    require_user(&data).await?;
    let outcome = data
        .election
        .end_election(body.confirm)
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

async fn start_new_election(
    data: web::Data<AppState>,
    body: web::Json<ConfirmRequest>,
) -> Result<HttpResponse, AppError> {
    require_user(&data).await?;
    let outcome = data
        .election
        .start_new_election(body.confirm)
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

fn dev_chain(data: &AppState) -> Result<&DevChain, AppError> {
    data.dev_chain
        .as_deref()
        .ok_or(AppError::NotPermitted("Not running on the dev chain"))
}

async fn dev_accounts(data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let chain = dev_chain(&data)?;
    Ok(HttpResponse::Ok().json(json!({
        "admin": chain.admin(),
        "accounts": chain.accounts(),
    })))
}

/// Changes the dev chain's active account; the wallet watcher picks it up.
async fn dev_switch_account(
    data: web::Data<AppState>,
    body: web::Json<SwitchAccountRequest>,
) -> Result<HttpResponse, AppError> {
    dev_chain(&data)?.switch_account(body.account);
    Ok(HttpResponse::Accepted().json(json!({ "account": body.account })))
}
