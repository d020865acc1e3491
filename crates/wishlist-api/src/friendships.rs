//! Friendship requests and the friendships they produce.
//!
//! A request is `pending` until the receiver accepts it (the request row is
//! replaced by two mirrored friendship rows) or rejects it (the row stays,
//! marked `rejected`). The sender may cancel a request in any state, which
//! deletes it and frees the pair for a new request.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use wishlist_db::models::{FriendshipRequestRow, FriendshipRow};
use wishlist_types::api::{
    CreateFriendshipRequest, FriendshipRequestResponse, FriendshipResponse, ProfileResponse,
};
use wishlist_types::models::FriendshipRequestStatus;

use crate::error::ApiError;
use crate::middleware::CurrentAccount;
use crate::profiles::profile_response;
use crate::state::{AppState, with_db};

fn request_response(row: FriendshipRequestRow) -> FriendshipRequestResponse {
    FriendshipRequestResponse {
        id: row.id,
        sender_id: row.sender_id,
        receiver_id: row.receiver_id,
        status: row.status,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn friendship_response(row: FriendshipRow) -> FriendshipResponse {
    FriendshipResponse {
        account_id: row.account_id,
        friend_id: row.friend_id,
        created_at: row.created_at,
    }
}

// -- Friends --

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = with_db(&state, move |db| db.list_friends(current.account_id)).await?;
    let friends: Vec<ProfileResponse> = rows.into_iter().map(profile_response).collect();
    Ok(Json(friends))
}

pub async fn remove_friend(
    State(state): State<AppState>,
    Path(friend_id): Path<i64>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<StatusCode, ApiError> {
    let removed =
        with_db(&state, move |db| db.delete_friendship(current.account_id, friend_id)).await?;
    if !removed {
        return Err(ApiError::not_found("not friends"));
    }

    info!("Accounts {} and {} are no longer friends", current.account_id, friend_id);
    Ok(StatusCode::NO_CONTENT)
}

// -- Requests --

pub async fn send_request(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Json(req): Json<CreateFriendshipRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sender_id = current.account_id;
    let receiver_id = req.receiver_id;
    if sender_id == receiver_id {
        return Err(ApiError::bad_request("cannot befriend yourself"));
    }

    let created = with_db(&state, move |db| {
        if db.get_account(receiver_id)?.is_none() {
            return Ok(Err(ApiError::not_found("account not found")));
        }
        if db.are_friends(sender_id, receiver_id)? {
            return Ok(Err(ApiError::bad_request("already friends")));
        }
        if db.find_friendship_request_between(sender_id, receiver_id)?.is_some() {
            return Ok(Err(ApiError::bad_request("friendship request already exists")));
        }
        Ok(Ok(db.create_friendship_request(sender_id, receiver_id)?))
    })
    .await??;

    info!(
        "Friendship request {} from {} to {}",
        created.id, sender_id, receiver_id
    );
    Ok((StatusCode::CREATED, Json(request_response(created))))
}

pub async fn incoming_requests(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = with_db(&state, move |db| db.incoming_friendship_requests(current.account_id)).await?;
    let requests: Vec<FriendshipRequestResponse> = rows.into_iter().map(request_response).collect();
    Ok(Json(requests))
}

pub async fn outgoing_requests(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = with_db(&state, move |db| db.outgoing_friendship_requests(current.account_id)).await?;
    let requests: Vec<FriendshipRequestResponse> = rows.into_iter().map(request_response).collect();
    Ok(Json(requests))
}

/// Load a request the caller is the receiver of and that is still pending.
async fn pending_for_receiver(
    state: &AppState,
    request_id: i64,
    current: CurrentAccount,
) -> Result<FriendshipRequestRow, ApiError> {
    let request = with_db(state, move |db| db.get_friendship_request(request_id))
        .await?
        .ok_or_else(|| ApiError::not_found("friendship request not found"))?;

    if request.receiver_id != current.account_id {
        return Err(ApiError::not_allowed("only the receiver can answer a request"));
    }
    if request.status != FriendshipRequestStatus::Pending {
        return Err(ApiError::bad_request(format!("request is already {}", request.status)));
    }
    Ok(request)
}

pub async fn accept_request(
    State(state): State<AppState>,
    Path(request_id): Path<i64>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<Json<FriendshipResponse>, ApiError> {
    let request = pending_for_receiver(&state, request_id, current).await?;

    // None means someone answered it between our check and the write
    let friendship = with_db(&state, move |db| db.accept_friendship_request(request_id))
        .await?
        .ok_or_else(|| ApiError::bad_request("request is no longer pending"))?;

    info!(
        "Friendship request {} accepted: {} and {} are friends",
        request_id, request.receiver_id, request.sender_id
    );
    Ok(Json(friendship_response(friendship)))
}

pub async fn reject_request(
    State(state): State<AppState>,
    Path(request_id): Path<i64>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<Json<FriendshipRequestResponse>, ApiError> {
    pending_for_receiver(&state, request_id, current).await?;

    let rejected = with_db(&state, move |db| db.reject_friendship_request(request_id))
        .await?
        .ok_or_else(|| ApiError::bad_request("request is no longer pending"))?;

    info!("Friendship request {} rejected", request_id);
    Ok(Json(request_response(rejected)))
}

/// Cancel a request. Only its sender may do this.
pub async fn cancel_request(
    State(state): State<AppState>,
    Path(request_id): Path<i64>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<StatusCode, ApiError> {
    let request = with_db(&state, move |db| db.get_friendship_request(request_id))
        .await?
        .ok_or_else(|| ApiError::not_found("friendship request not found"))?;

    if request.sender_id != current.account_id {
        return Err(ApiError::not_allowed("only the sender can cancel a request"));
    }

    with_db(&state, move |db| db.delete_friendship_request(request_id)).await?;
    info!("Friendship request {} cancelled", request_id);
    Ok(StatusCode::NO_CONTENT)
}
