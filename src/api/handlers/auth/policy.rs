//! Role gates for handlers.
//!
//! Authentication failures (no or invalid credential) surface as 401 through
//! [`AuthError`]; a valid credential with too little privilege is `Forbidden`
//! (403). Handlers call [`require`] first and only then touch their inputs.

use axum::http::HeaderMap;

use super::{
    error::AuthError,
    state::AuthState,
    token::TokenClass,
    types::Principal,
    verifier::bearer_token,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequiredRole {
    Anonymous,
    Authenticated,
    Admin,
}

#[must_use]
pub fn authorize(principal: Option<&Principal>, required: RequiredRole) -> bool {
    match required {
        RequiredRole::Anonymous => true,
        RequiredRole::Authenticated => principal.is_some(),
        RequiredRole::Admin => principal.is_some_and(|principal| principal.is_admin),
    }
}

/// Resolve the caller and check it against `required`.
///
/// For `Anonymous`, a request without an `Authorization` header yields
/// `Ok(None)`; a header that is present but invalid still fails.
///
/// # Errors
/// Authentication errors from the verifier, `MissingCredential` when a
/// principal is required but none was presented, `Forbidden` on role denial.
pub async fn require(
    headers: &HeaderMap,
    state: &AuthState,
    required: RequiredRole,
) -> Result<Option<Principal>, AuthError> {
    let principal = match bearer_token(headers) {
        Ok(token) => Some(state.verifier().verify(token, TokenClass::Access).await?),
        Err(AuthError::MissingCredential) => None,
        Err(err) => return Err(err),
    };

    if authorize(principal.as_ref(), required) {
        Ok(principal)
    } else if principal.is_none() {
        Err(AuthError::MissingCredential)
    } else {
        Err(AuthError::Forbidden)
    }
}
