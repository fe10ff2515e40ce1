//! Credential verification and bearer header parsing.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use std::sync::Arc;
use tracing::instrument;

use super::{
    error::AuthError,
    storage::PrincipalStore,
    token::{now_unix_seconds, TokenClass, TokenCodec},
    types::Principal,
};

/// Resolves a presented credential to a principal.
///
/// Holds only immutable state, so one instance serves every request.
pub struct CredentialVerifier {
    codec: TokenCodec,
    principals: Arc<dyn PrincipalStore>,
}

impl CredentialVerifier {
    #[must_use]
    pub fn new(codec: TokenCodec, principals: Arc<dyn PrincipalStore>) -> Self {
        Self { codec, principals }
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    #[must_use]
    pub fn principals(&self) -> &Arc<dyn PrincipalStore> {
        &self.principals
    }

    /// Verify `token` against the current clock.
    ///
    /// # Errors
    /// See [`CredentialVerifier::verify_at`].
    pub async fn verify(&self, token: &str, expected: TokenClass) -> Result<Principal, AuthError> {
        self.verify_at(token, expected, now_unix_seconds()).await
    }

    /// Verify `token` as of `now` (unix seconds).
    ///
    /// # Errors
    /// - `Malformed` / `Expired` from the codec.
    /// - `WrongTokenClass` when the credential is of the other class.
    /// - `PrincipalNotFound` when the subject no longer exists.
    #[instrument(skip(self, token), fields(expected = expected.as_str()))]
    pub async fn verify_at(
        &self,
        token: &str,
        expected: TokenClass,
        now: i64,
    ) -> Result<Principal, AuthError> {
        let claims = self.codec.decode(token, now)?;
        if claims.token_type != expected {
            return Err(AuthError::WrongTokenClass);
        }

        self.principals
            .find_by_id(claims.user_id)
            .await?
            .ok_or(AuthError::PrincipalNotFound)
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// # Errors
/// - `MissingCredential` when the header is absent.
/// - `MalformedHeader` when the value is not `<bearer> <token>` split on a single space.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingCredential)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let mut parts = value.split(' ');
    let (Some(prefix), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AuthError::MalformedHeader);
    };

    if !prefix.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }

    Ok(token)
}
