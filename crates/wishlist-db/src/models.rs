//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the API types in `wishlist-types`.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use wishlist_types::models::FriendshipRequestStatus;

#[derive(Debug, Clone)]
pub struct AccountRow {
    pub id: i64,
    pub email: String,
    pub login: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: Uuid,
    pub account_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile joined with its account's login.
#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub account_id: i64,
    pub login: String,
    pub name: String,
    pub description: String,
    pub avatar_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct FileRow {
    pub id: Uuid,
    /// Uploader. `None` only for files stored before uploads were owned.
    pub owner_id: Option<i64>,
    pub extension: String,
    pub mime_type: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FriendshipRow {
    pub account_id: i64,
    pub friend_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FriendshipRequestRow {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub status: FriendshipRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct WishRow {
    pub id: i64,
    pub account_id: i64,
    pub title: String,
    pub description: String,
    pub avatar_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BookingRow {
    pub id: i64,
    pub wish_id: i64,
    pub account_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Partial update: `None` leaves a column untouched.
#[derive(Debug, Default, Clone)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar_id: Option<Option<Uuid>>,
}

#[derive(Debug, Default, Clone)]
pub struct WishChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub avatar_id: Option<Option<Uuid>>,
}
