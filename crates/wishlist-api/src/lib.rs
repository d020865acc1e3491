pub mod accounts;
pub mod auth;
pub mod cleanup;
pub mod error;
pub mod files;
pub mod friendships;
pub mod middleware;
pub mod profiles;
pub mod routes;
pub mod state;
pub mod storage;
pub mod validation;
pub mod wishes;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner};
