use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use wishlist_types::api::{Claims, SessionResponse, SignInRequest, SignUpRequest, TokenResponse};

use crate::error::ApiError;
use crate::middleware::CurrentAccount;
use crate::state::{AppState, with_db};
use crate::validation::{check_password, normalize_email, normalize_login};

pub async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email)?;
    let login = normalize_login(&req.login)?;
    check_password(&req.password)?;

    let (e, l) = (email.clone(), login.clone());
    let (email_taken, login_taken) = with_db(&state, move |db| {
        Ok((db.email_taken(&e, None)?, db.login_taken(&l, None)?))
    })
    .await?;
    if email_taken {
        return Err(ApiError::bad_request("email already registered"));
    }
    if login_taken {
        return Err(ApiError::bad_request("login already taken"));
    }

    let password_hash = hash_password(&req.password)?;
    let session_id = Uuid::new_v4();

    let (account, _session) = with_db(&state, move |db| {
        db.create_account(&email, &login, &password_hash, session_id)
    })
    .await?;

    let access_token = issue_token(&state.jwt_secret, account.id, session_id, Utc::now())?;
    info!("Account {} ({}) signed up", account.id, account.login);

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            account_id: account.id,
            session_id,
            access_token,
            token_type: "bearer".into(),
        }),
    ))
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identifier = req.login.trim().to_string();
    let found = with_db(&state, move |db| {
        let Some(account) = db.get_account_by_identifier(&identifier)? else {
            return Ok(None);
        };
        let hash = db.get_password_hash(account.id)?;
        Ok(hash.map(|h| (account, h)))
    })
    .await?;

    let (account, stored_hash) = found.ok_or(ApiError::NotAuthenticated)?;
    if !verify_password(&stored_hash, &req.password)? {
        return Err(ApiError::NotAuthenticated);
    }

    let account_id = account.id;
    let session_id = Uuid::new_v4();
    with_db(&state, move |db| db.create_session(account_id, session_id)).await?;

    let access_token = issue_token(&state.jwt_secret, account_id, session_id, Utc::now())?;
    info!("Account {} signed in (session {})", account_id, session_id);

    Ok(Json(TokenResponse {
        account_id,
        session_id,
        access_token,
        token_type: "bearer".into(),
    }))
}

pub async fn sign_out(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<StatusCode, ApiError> {
    with_db(&state, move |db| {
        db.delete_session(current.session_id, current.account_id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = with_db(&state, move |db| db.list_sessions(current.account_id)).await?;

    let sessions: Vec<SessionResponse> = rows
        .into_iter()
        .map(|row| SessionResponse {
            current: row.id == current.session_id,
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
        .collect();

    Ok(Json(sessions))
}

pub async fn revoke_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<StatusCode, ApiError> {
    let deleted =
        with_db(&state, move |db| db.delete_session(session_id, current.account_id)).await?;
    if !deleted {
        return Err(ApiError::not_found("session not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Sign out everywhere except the calling session.
pub async fn revoke_other_sessions(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<StatusCode, ApiError> {
    let revoked = with_db(&state, move |db| {
        db.delete_other_sessions(current.account_id, current.session_id)
    })
    .await?;
    info!("Account {} revoked {} other sessions", current.account_id, revoked);
    Ok(StatusCode::NO_CONTENT)
}

pub fn issue_token(
    secret: &str,
    account_id: i64,
    session_id: Uuid,
    now: DateTime<Utc>,
) -> Result<String, ApiError> {
    let claims = Claims {
        account_id,
        session_id,
        issued_at: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(token)
}

/// Argon2id PHC string, as bytes for the `password_hashes` table.
pub fn hash_password(password: &str) -> Result<Vec<u8>, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?
        .to_string();
    Ok(hash.into_bytes())
}

pub fn verify_password(stored: &[u8], password: &str) -> Result<bool, ApiError> {
    let encoded = std::str::from_utf8(stored).map_err(|e| ApiError::Internal(e.into()))?;
    let parsed = PasswordHash::new(encoded)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password(&hash, "correct horse").unwrap());
        assert!(!verify_password(&hash, "wrong horse").unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn garbage_hash_is_internal() {
        assert!(matches!(
            verify_password(b"not a phc string", "x"),
            Err(ApiError::Internal(_))
        ));
    }
}
