use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;

use wishlist_db::models::AccountRow;
use wishlist_types::api::{
    AccountResponse, ChangePasswordRequest, ProfileResponse, UpdateAccountRequest,
};

use crate::auth::{hash_password, verify_password};
use crate::cleanup::spawn_delete_blobs;
use crate::error::ApiError;
use crate::middleware::CurrentAccount;
use crate::profiles::profile_response;
use crate::state::{AppState, with_db};
use crate::validation::{check_password, normalize_email, normalize_login};

const SEARCH_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub login: String,
}

pub(crate) fn account_response(row: AccountRow) -> AccountResponse {
    AccountResponse {
        id: row.id,
        email: row.email,
        login: row.login,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

pub async fn get_me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = with_db(&state, move |db| db.get_account(current.account_id))
        .await?
        .ok_or_else(|| ApiError::not_found("account not found"))?;
    Ok(Json(account_response(account)))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Json(req): Json<UpdateAccountRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let email = req.email.as_deref().map(normalize_email).transpose()?;
    let login = req.login.as_deref().map(normalize_login).transpose()?;
    let account_id = current.account_id;

    let updated = with_db(&state, move |db| {
        if let Some(email) = &email {
            if db.email_taken(email, Some(account_id))? {
                return Ok(Err(ApiError::bad_request("email already registered")));
            }
        }
        if let Some(login) = &login {
            if db.login_taken(login, Some(account_id))? {
                return Ok(Err(ApiError::bad_request("login already taken")));
            }
        }
        Ok(Ok(db.update_account(account_id, email.as_deref(), login.as_deref())?))
    })
    .await??
    .ok_or_else(|| ApiError::not_found("account not found"))?;

    Ok(Json(account_response(updated)))
}

/// Changing the password signs out every other session.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    check_password(&req.new_password)?;

    let stored = with_db(&state, move |db| db.get_password_hash(current.account_id))
        .await?
        .ok_or_else(|| ApiError::not_found("account not found"))?;
    if !verify_password(&stored, &req.old_password)? {
        return Err(ApiError::not_allowed("wrong password"));
    }

    let new_hash = hash_password(&req.new_password)?;
    let revoked = with_db(&state, move |db| {
        db.set_password_hash(current.account_id, &new_hash, current.session_id)
    })
    .await?;

    info!(
        "Account {} changed password, {} other sessions revoked",
        current.account_id, revoked
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<StatusCode, ApiError> {
    let removed_files = with_db(&state, move |db| db.delete_account(current.account_id)).await?;
    spawn_delete_blobs(state.clone(), removed_files);

    info!("Account {} deleted", current.account_id);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /accounts/search?login=<prefix>
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Extension(_current): Extension<CurrentAccount>,
) -> Result<impl IntoResponse, ApiError> {
    let prefix = query.login.trim().to_string();
    if prefix.is_empty() {
        return Err(ApiError::bad_request("login prefix required"));
    }

    let rows = with_db(&state, move |db| db.search_profiles(&prefix, SEARCH_LIMIT)).await?;
    let profiles: Vec<ProfileResponse> = rows.into_iter().map(profile_response).collect();
    Ok(Json(profiles))
}
