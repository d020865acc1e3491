use axum::{
    Extension, Json,
    extract::{Path, State},
};

use wishlist_db::models::{ProfileChanges, ProfileRow};
use wishlist_types::api::{ProfileResponse, UpdateProfileRequest};

use crate::cleanup::spawn_delete_blobs;
use crate::error::ApiError;
use crate::files::check_avatar;
use crate::middleware::CurrentAccount;
use crate::state::{AppState, with_db};
use crate::validation::check_length;

pub const MAX_NAME_LEN: usize = 64;
pub const MAX_DESCRIPTION_LEN: usize = 1024;

pub(crate) fn profile_response(row: ProfileRow) -> ProfileResponse {
    ProfileResponse {
        account_id: row.account_id,
        login: row.login,
        name: row.name,
        description: row.description,
        avatar_id: row.avatar_id,
    }
}

pub async fn get_me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<Json<ProfileResponse>, ApiError> {
    fetch(&state, current.account_id).await
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
    Extension(_current): Extension<CurrentAccount>,
) -> Result<Json<ProfileResponse>, ApiError> {
    fetch(&state, account_id).await
}

async fn fetch(state: &AppState, account_id: i64) -> Result<Json<ProfileResponse>, ApiError> {
    let profile = with_db(state, move |db| db.get_profile(account_id))
        .await?
        .ok_or_else(|| ApiError::not_found("profile not found"))?;
    Ok(Json(profile_response(profile)))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let name = req.name.map(|n| n.trim().to_string());
    if let Some(name) = &name {
        check_length("name", name, 1, MAX_NAME_LEN)?;
    }
    if let Some(description) = &req.description {
        check_length("description", description, 0, MAX_DESCRIPTION_LEN)?;
    }

    let changes = ProfileChanges {
        name,
        description: req.description,
        avatar_id: req.avatar_id,
    };

    let account_id = current.account_id;
    let (profile, replaced) = with_db(&state, move |db| {
        if let Some(Some(avatar)) = changes.avatar_id {
            if let Err(e) = check_avatar(db, avatar, account_id)? {
                return Ok(Err(e));
            }
        }
        Ok(Ok(db.update_profile(account_id, &changes)?))
    })
    .await??
    .ok_or_else(|| ApiError::not_found("profile not found"))?;

    spawn_delete_blobs(state.clone(), replaced.into_iter().collect());
    Ok(Json(profile_response(profile)))
}
