use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use tracing::debug;
use uuid::Uuid;

use wishlist_types::api::Claims;

use crate::error::ApiError;
use crate::state::{AppState, with_db};

/// The authenticated caller, inserted into request extensions by
/// [`require_auth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentAccount {
    pub account_id: i64,
    pub session_id: Uuid,
}

/// Check the signature and decode the claims. Expiry is ours to enforce
/// (see [`check_expiry`]), so the library's `exp` handling is off.
pub fn decode_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            debug!("Rejected token: {}", e);
            ApiError::NotAuthenticated
        })
}

pub fn check_expiry(
    claims: &Claims,
    ttl: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<(), ApiError> {
    if now.timestamp() - claims.issued_at > ttl.num_seconds() {
        return Err(ApiError::not_allowed("token expired"));
    }
    Ok(())
}

/// Full token check: signature, expiry window, then the session must
/// still exist for the account.
pub async fn authenticate(state: &AppState, token: &str) -> Result<CurrentAccount, ApiError> {
    let claims = decode_token(&state.jwt_secret, token)?;
    check_expiry(&claims, state.token_ttl, Utc::now())?;

    let Claims {
        account_id,
        session_id,
        ..
    } = claims;
    let alive = with_db(state, move |db| db.session_exists(session_id, account_id)).await?;
    if !alive {
        debug!("Session {} for account {} is gone", session_id, account_id);
        return Err(ApiError::NotAuthenticated);
    }

    Ok(CurrentAccount {
        account_id,
        session_id,
    })
}

/// Extract and validate the bearer token from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|_| ApiError::NotAuthenticated)?;
    let current = authenticate(&state, bearer.token()).await?;

    req.extensions_mut().insert(current);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::issue_token;

    const SECRET: &str = "test-secret";

    #[test]
    fn issued_token_decodes() {
        let session_id = Uuid::new_v4();
        let now = Utc::now();
        let token = issue_token(SECRET, 7, session_id, now).unwrap();

        let claims = decode_token(SECRET, &token).unwrap();
        assert_eq!(claims.account_id, 7);
        assert_eq!(claims.session_id, session_id);
        assert_eq!(claims.issued_at, now.timestamp());
    }

    #[test]
    fn wrong_secret_or_garbage_is_unauthenticated() {
        let token = issue_token(SECRET, 7, Uuid::new_v4(), Utc::now()).unwrap();
        assert!(matches!(decode_token("other", &token), Err(ApiError::NotAuthenticated)));
        assert!(matches!(decode_token(SECRET, "not.a.jwt"), Err(ApiError::NotAuthenticated)));
    }

    #[test]
    fn expiry_is_an_authorization_error() {
        let ttl = chrono::Duration::hours(1);
        let now = Utc::now();
        let fresh = Claims {
            account_id: 1,
            session_id: Uuid::new_v4(),
            issued_at: now.timestamp(),
        };
        assert!(check_expiry(&fresh, ttl, now).is_ok());
        assert!(check_expiry(&fresh, ttl, now + ttl).is_ok());

        let err = check_expiry(&fresh, ttl, now + ttl + chrono::Duration::seconds(1)).unwrap_err();
        assert!(matches!(err, ApiError::NotAllowed(_)));
    }
}
