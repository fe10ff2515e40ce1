//! Auth state and configuration.

use secrecy::SecretString;
use std::sync::Arc;

use super::{
    storage::PrincipalStore,
    token::{TokenClass, TokenCodec},
    verifier::CredentialVerifier,
};

pub(super) const ACCESS_TOKEN_COOKIE_NAME: &str = "access_token";

#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    cookie_secure: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    /// The access cookie lives exactly as long as the access token it carries.
    #[must_use]
    pub fn access_cookie_max_age(&self) -> i64 {
        TokenClass::Access.ttl_seconds()
    }
}

/// Immutable auth state shared by every request.
pub struct AuthState {
    config: AuthConfig,
    verifier: CredentialVerifier,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        jwt_secret: SecretString,
        principals: Arc<dyn PrincipalStore>,
    ) -> Self {
        Self {
            config,
            verifier: CredentialVerifier::new(TokenCodec::new(jwt_secret), principals),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn verifier(&self) -> &CredentialVerifier {
        &self.verifier
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        self.verifier.codec()
    }

    #[must_use]
    pub fn principals(&self) -> &Arc<dyn PrincipalStore> {
        self.verifier.principals()
    }
}
