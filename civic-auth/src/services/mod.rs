//! Services layer: the authentication core and its collaborators.

pub mod error;
mod jwt;
pub mod provider;
mod registration;
mod saga;
mod session;
pub mod store;
mod verifier;

pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService};
pub use provider::{HttpIdentityProvider, IdentityProvider, MockIdentityProvider, ProviderClaims};
pub use registration::RegistrationService;
pub use saga::Saga;
pub use session::{SessionManager, TokenPair};
pub use store::{CredentialStore, MemoryStore, PgStore, StoreError};
pub use verifier::CredentialVerifier;
