//! Data models for the authentication core.

mod session;
mod user;

pub use session::Session;
pub use user::{SanitizedUser, User, UserRole};
