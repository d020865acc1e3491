use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::models::FriendshipRequestStatus;

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in PATCH bodies.
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

// -- Token claims --

/// Claims carried by every access token. A token is only as good as the
/// session it names: revoking the session invalidates the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub account_id: i64,
    pub session_id: Uuid,
    /// Unix seconds.
    pub issued_at: i64,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignUpRequest {
    pub email: String,
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignInRequest {
    /// Login or email.
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub account_id: i64,
    pub session_id: Uuid,
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub current: bool,
}

// -- Accounts --

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: i64,
    pub email: String,
    pub login: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAccountRequest {
    pub email: Option<String>,
    pub login: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

// -- Profiles --

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub account_id: i64,
    pub login: String,
    pub name: String,
    pub description: String,
    pub avatar_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub avatar_id: Option<Option<Uuid>>,
}

// -- Files --

#[derive(Debug, Serialize, Deserialize)]
pub struct FileResponse {
    pub id: Uuid,
    pub owner_id: Option<i64>,
    pub extension: String,
    pub mime_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Friendships --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFriendshipRequest {
    pub receiver_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendshipRequestResponse {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub status: FriendshipRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendshipResponse {
    pub account_id: i64,
    pub friend_id: i64,
    pub created_at: DateTime<Utc>,
}

// -- Wishes --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateWishRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub avatar_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateWishRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub avatar_id: Option<Option<Uuid>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingResponse {
    pub id: i64,
    pub wish_id: i64,
    pub account_id: i64,
    pub created_at: DateTime<Utc>,
}

/// A wish as seen by a particular caller. Booking details are withheld
/// from the owner.
#[derive(Debug, Serialize, Deserialize)]
pub struct WishResponse {
    pub id: i64,
    pub account_id: i64,
    pub title: String,
    pub description: String,
    pub avatar_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_booked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub booking: Option<BookingResponse>,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_distinguishes_null_from_missing() {
        let missing: UpdateProfileRequest = serde_json::from_str(r#"{"name":"Ann"}"#).unwrap();
        assert_eq!(missing.avatar_id, None);

        let cleared: UpdateProfileRequest = serde_json::from_str(r#"{"avatar_id":null}"#).unwrap();
        assert_eq!(cleared.avatar_id, Some(None));

        let id = Uuid::new_v4();
        let set: UpdateWishRequest =
            serde_json::from_str(&format!(r#"{{"avatar_id":"{id}"}}"#)).unwrap();
        assert_eq!(set.avatar_id, Some(Some(id)));
    }

    #[test]
    fn unknown_fields_are_refused() {
        let res = serde_json::from_str::<SignUpRequest>(
            r#"{"email":"a@b.c","login":"ann","password":"hunter22","admin":true}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn owner_view_omits_booking_fields() {
        let wish = WishResponse {
            id: 1,
            account_id: 2,
            title: "Bike".into(),
            description: String::new(),
            avatar_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            is_booked: None,
            booking: None,
        };
        let value = serde_json::to_value(&wish).unwrap();
        assert!(value.get("is_booked").is_none());
        assert!(value.get("booking").is_none());
    }
}
