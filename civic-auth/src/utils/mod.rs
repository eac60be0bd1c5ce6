pub mod password;
pub mod validation;

pub use password::{hash_password, password_matches};
pub use validation::ValidatedJson;
