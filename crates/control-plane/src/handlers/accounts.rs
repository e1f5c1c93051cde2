//! Cloud account API handlers.
//!
//! Credentials go in but never come back out.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::error::AppResult;
use crate::model::{AccountSummary, CloudAccount};
use crate::services::{AccountGetter, AccountService};

/// Register a cloud account.
///
/// `POST /accounts`
///
/// # Request Body
///
/// ```json
/// {
///   "name": "do-main",
///   "provider": "digitalocean",
///   "credentials": {"accessToken": "..."}
/// }
/// ```
pub async fn create(
    State(service): State<AccountService>,
    Json(account): Json<CloudAccount>,
) -> AppResult<(StatusCode, Json<AccountSummary>)> {
    let account = service.create(account).await?;
    Ok((StatusCode::CREATED, Json(AccountSummary::from(&account))))
}

/// `GET /accounts`
pub async fn list(State(service): State<AccountService>) -> AppResult<Json<Vec<AccountSummary>>> {
    let accounts = service.list().await?;
    Ok(Json(accounts.iter().map(AccountSummary::from).collect()))
}

/// `GET /accounts/{name}`
pub async fn get(
    State(service): State<AccountService>,
    Path(name): Path<String>,
) -> AppResult<Json<AccountSummary>> {
    let account = service.get(&name).await?;
    Ok(Json(AccountSummary::from(&account)))
}
