//! Accounts and bearer-token sessions.

mod session;
mod users;

pub use session::{InMemorySessionStore, SessionStore};
pub use users::UserStore;

use crate::db::warehouse::WarehouseError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("User already exists")]
    UserExists,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Database(#[from] WarehouseError),
}
