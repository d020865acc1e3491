use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{accounts, auth, files, friendships, profiles, wishes};

/// Headroom on top of the file size limit for multipart framing.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// The full HTTP surface. Server-wide layers (CORS, tracing) are added by
/// the binary.
pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/sign-up", post(auth::sign_up))
        .route("/auth/sign-in", post(auth::sign_in));

    let protected_routes = Router::new()
        // Auth sessions
        .route("/auth/sign-out", post(auth::sign_out))
        .route(
            "/auth/sessions",
            get(auth::list_sessions).delete(auth::revoke_other_sessions),
        )
        .route("/auth/sessions/{session_id}", delete(auth::revoke_session))
        // Accounts
        .route(
            "/accounts/me",
            get(accounts::get_me)
                .patch(accounts::update_me)
                .delete(accounts::delete_me),
        )
        .route("/accounts/me/password", put(accounts::change_password))
        .route("/accounts/search", get(accounts::search))
        .route("/accounts/{account_id}/wishes", get(wishes::list_account_wishes))
        // Profiles
        .route("/profiles/me", get(profiles::get_me).patch(profiles::update_me))
        .route("/profiles/{account_id}", get(profiles::get_profile))
        // Files
        .route("/files", post(files::upload_file))
        .route("/files/{file_id}", get(files::get_file))
        .route("/files/{file_id}/content", get(files::download_file))
        // Friendships
        .route("/friends", get(friendships::list_friends))
        .route("/friends/{friend_id}", delete(friendships::remove_friend))
        .route("/friendship-requests", post(friendships::send_request))
        .route("/friendship-requests/incoming", get(friendships::incoming_requests))
        .route("/friendship-requests/outgoing", get(friendships::outgoing_requests))
        .route(
            "/friendship-requests/{request_id}",
            delete(friendships::cancel_request),
        )
        .route(
            "/friendship-requests/{request_id}/accept",
            post(friendships::accept_request),
        )
        .route(
            "/friendship-requests/{request_id}/reject",
            post(friendships::reject_request),
        )
        // Wishes
        .route("/wishes", get(wishes::list_my_wishes).post(wishes::create_wish))
        .route(
            "/wishes/{wish_id}",
            get(wishes::get_wish)
                .patch(wishes::update_wish)
                .delete(wishes::delete_wish),
        )
        .route(
            "/wishes/{wish_id}/booking",
            post(wishes::book_wish).delete(wishes::unbook_wish),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// GET /health: liveness check (no auth).
pub async fn health() -> &'static str {
    "ok"
}
