//! Auth handlers and supporting modules.
//!
//! Sign-in issues two stateless HS256 credentials: an `access` token for the
//! `Authorization: Bearer` header (2 hours) and a `refresh` token to obtain a
//! new pair (7 days). Neither is stored server-side.
//!
//! ## Revocation
//!
//! There is no denylist. Logging out clears the `access_token` cookie only,
//! and a refresh token stays valid until it expires even after it has been
//! exchanged. Rotating the signing secret invalidates every issued token.

pub mod error;
pub mod policy;
pub(crate) mod session;
mod state;
pub mod storage;
pub mod token;
pub mod types;
mod utils;
pub mod verifier;

pub use error::AuthError;
pub use state::{AuthConfig, AuthState};
pub use storage::{PgPrincipalStore, PrincipalStore};
pub(crate) use utils::{hash_password, normalize_email, valid_email};

#[cfg(test)]
pub(crate) use utils::verify_password;
