use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use wishlist_db::models::{BookingRow, WishChanges, WishRow};
use wishlist_types::api::{BookingResponse, CreateWishRequest, UpdateWishRequest, WishResponse};

use crate::cleanup::spawn_delete_blobs;
use crate::error::ApiError;
use crate::files::check_avatar;
use crate::middleware::CurrentAccount;
use crate::state::{AppState, with_db};
use crate::validation::check_length;

pub const MAX_TITLE_LEN: usize = 128;
pub const MAX_DESCRIPTION_LEN: usize = 2048;

fn booking_response(row: BookingRow) -> BookingResponse {
    BookingResponse {
        id: row.id,
        wish_id: row.wish_id,
        account_id: row.account_id,
        created_at: row.created_at,
    }
}

/// Owners never see booking state; everyone else sees whether and by whom.
fn wish_response(row: WishRow, viewer: i64, booking: Option<BookingRow>) -> WishResponse {
    let owner_view = row.account_id == viewer;
    WishResponse {
        id: row.id,
        account_id: row.account_id,
        title: row.title,
        description: row.description,
        avatar_id: row.avatar_id,
        created_at: row.created_at,
        updated_at: row.updated_at,
        is_booked: (!owner_view).then_some(booking.is_some()),
        booking: booking.filter(|_| !owner_view).map(booking_response),
    }
}

/// Load a wish the caller may look at: their own, or a friend's.
async fn visible_wish(
    state: &AppState,
    wish_id: i64,
    current: CurrentAccount,
) -> Result<WishRow, ApiError> {
    let viewer = current.account_id;
    with_db(state, move |db| {
        let Some(wish) = db.get_wish(wish_id)? else {
            return Ok(Err(ApiError::not_found("wish not found")));
        };
        if wish.account_id != viewer && !db.are_friends(viewer, wish.account_id)? {
            return Ok(Err(ApiError::not_allowed("wish belongs to someone who is not your friend")));
        }
        Ok(Ok(wish))
    })
    .await?
}

/// Load a wish the caller owns.
async fn owned_wish(
    state: &AppState,
    wish_id: i64,
    current: CurrentAccount,
) -> Result<WishRow, ApiError> {
    let wish = with_db(state, move |db| db.get_wish(wish_id))
        .await?
        .ok_or_else(|| ApiError::not_found("wish not found"))?;
    if wish.account_id != current.account_id {
        return Err(ApiError::not_allowed("only the owner can change a wish"));
    }
    Ok(wish)
}

pub async fn create_wish(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Json(req): Json<CreateWishRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim().to_string();
    check_length("title", &title, 1, MAX_TITLE_LEN)?;
    check_length("description", &req.description, 0, MAX_DESCRIPTION_LEN)?;

    let account_id = current.account_id;
    let description = req.description;
    let avatar_id = req.avatar_id;
    let wish = with_db(&state, move |db| {
        if let Some(avatar) = avatar_id {
            if let Err(e) = check_avatar(db, avatar, account_id)? {
                return Ok(Err(e));
            }
        }
        Ok(Ok(db.create_wish(account_id, &title, &description, avatar_id)?))
    })
    .await??;

    info!("Wish {} created by account {}", wish.id, account_id);
    Ok((StatusCode::CREATED, Json(wish_response(wish, account_id, None))))
}

/// GET /wishes: the caller's own list.
pub async fn list_my_wishes(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = current.account_id;
    let rows = with_db(&state, move |db| db.list_wishes(viewer)).await?;
    let wishes: Vec<WishResponse> = rows
        .into_iter()
        .map(|row| wish_response(row, viewer, None))
        .collect();
    Ok(Json(wishes))
}

/// GET /accounts/{account_id}/wishes: own list or a friend's.
pub async fn list_account_wishes(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = current.account_id;

    let (rows, bookings) = with_db(&state, move |db| {
        if db.get_account(account_id)?.is_none() {
            return Ok(Err(ApiError::not_found("account not found")));
        }
        if account_id != viewer && !db.are_friends(viewer, account_id)? {
            return Ok(Err(ApiError::not_allowed("not your friend")));
        }

        let rows = db.list_wishes(account_id)?;
        let bookings = if account_id == viewer {
            vec![]
        } else {
            let ids: Vec<i64> = rows.iter().map(|w| w.id).collect();
            db.get_bookings_for_wishes(&ids)?
        };
        Ok(Ok((rows, bookings)))
    })
    .await??;

    let mut by_wish: HashMap<i64, BookingRow> =
        bookings.into_iter().map(|b| (b.wish_id, b)).collect();
    let wishes: Vec<WishResponse> = rows
        .into_iter()
        .map(|row| {
            let booking = by_wish.remove(&row.id);
            wish_response(row, viewer, booking)
        })
        .collect();

    Ok(Json(wishes))
}

pub async fn get_wish(
    State(state): State<AppState>,
    Path(wish_id): Path<i64>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<Json<WishResponse>, ApiError> {
    let wish = visible_wish(&state, wish_id, current).await?;
    let booking = with_db(&state, move |db| db.get_booking(wish_id)).await?;
    Ok(Json(wish_response(wish, current.account_id, booking)))
}

pub async fn update_wish(
    State(state): State<AppState>,
    Path(wish_id): Path<i64>,
    Extension(current): Extension<CurrentAccount>,
    Json(req): Json<UpdateWishRequest>,
) -> Result<Json<WishResponse>, ApiError> {
    let title = req.title.map(|t| t.trim().to_string());
    if let Some(title) = &title {
        check_length("title", title, 1, MAX_TITLE_LEN)?;
    }
    if let Some(description) = &req.description {
        check_length("description", description, 0, MAX_DESCRIPTION_LEN)?;
    }

    owned_wish(&state, wish_id, current).await?;

    let owner = current.account_id;
    let changes = WishChanges {
        title,
        description: req.description,
        avatar_id: req.avatar_id,
    };
    let (wish, replaced) = with_db(&state, move |db| {
        if let Some(Some(avatar)) = changes.avatar_id {
            if let Err(e) = check_avatar(db, avatar, owner)? {
                return Ok(Err(e));
            }
        }
        Ok(Ok(db.update_wish(wish_id, &changes)?))
    })
    .await??
    .ok_or_else(|| ApiError::not_found("wish not found"))?;

    spawn_delete_blobs(state.clone(), replaced.into_iter().collect());
    Ok(Json(wish_response(wish, current.account_id, None)))
}

pub async fn delete_wish(
    State(state): State<AppState>,
    Path(wish_id): Path<i64>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<StatusCode, ApiError> {
    owned_wish(&state, wish_id, current).await?;

    let removed_avatar = with_db(&state, move |db| db.delete_wish(wish_id)).await?;
    spawn_delete_blobs(state.clone(), removed_avatar.into_iter().collect());

    info!("Wish {} deleted by account {}", wish_id, current.account_id);
    Ok(StatusCode::NO_CONTENT)
}

// -- Bookings --

/// POST /wishes/{wish_id}/booking: a friend claims the wish.
pub async fn book_wish(
    State(state): State<AppState>,
    Path(wish_id): Path<i64>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<impl IntoResponse, ApiError> {
    let wish = visible_wish(&state, wish_id, current).await?;
    if wish.account_id == current.account_id {
        return Err(ApiError::not_allowed("cannot book your own wish"));
    }

    let booker = current.account_id;
    let booking = with_db(&state, move |db| {
        if db.get_booking(wish_id)?.is_some() {
            return Ok(Err(ApiError::bad_request("wish is already booked")));
        }
        Ok(Ok(db.create_booking(wish_id, booker)?))
    })
    .await??;

    info!("Wish {} booked by account {}", wish_id, booker);
    Ok((StatusCode::CREATED, Json(booking_response(booking))))
}

/// DELETE /wishes/{wish_id}/booking: only whoever booked it may release it.
pub async fn unbook_wish(
    State(state): State<AppState>,
    Path(wish_id): Path<i64>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<StatusCode, ApiError> {
    let booking = with_db(&state, move |db| {
        if db.get_wish(wish_id)?.is_none() {
            return Ok(Err(ApiError::not_found("wish not found")));
        }
        Ok(db.get_booking(wish_id)?.ok_or_else(|| ApiError::not_found("wish is not booked")))
    })
    .await??;

    if booking.account_id != current.account_id {
        return Err(ApiError::not_allowed("only the booker can cancel a booking"));
    }

    with_db(&state, move |db| db.delete_booking(wish_id)).await?;
    info!("Booking on wish {} released by account {}", wish_id, current.account_id);
    Ok(StatusCode::NO_CONTENT)
}
