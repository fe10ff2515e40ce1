use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use super::token::TokenError;
use crate::api::handlers::error::error_response;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("malformed authorization header")]
    MalformedHeader,
    #[error("malformed token")]
    Malformed,
    #[error("token expired")]
    Expired,
    #[error("wrong token class")]
    WrongTokenClass,
    #[error("principal not found")]
    PrincipalNotFound,
    #[error("incorrect password")]
    IncorrectPassword,
    #[error("inactive account")]
    InactiveAccount,
    #[error("insufficient role")]
    Forbidden,
    #[error("store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => Self::Malformed,
            TokenError::Expired => Self::Expired,
            other => Self::Store(anyhow::Error::new(other)),
        }
    }
}

impl AuthError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredential
            | Self::MalformedHeader
            | Self::Malformed
            | Self::Expired
            | Self::WrongTokenClass
            | Self::IncorrectPassword => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::InactiveAccount => StatusCode::FORBIDDEN,
            Self::PrincipalNotFound => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::MalformedHeader => "malformed_header",
            Self::Malformed => "malformed_token",
            Self::Expired => "token_expired",
            Self::WrongTokenClass => "wrong_token_class",
            Self::PrincipalNotFound => "principal_not_found",
            Self::IncorrectPassword => "incorrect_password",
            Self::InactiveAccount => "inactive_account",
            Self::Forbidden => "forbidden",
            Self::Store(_) => "internal_error",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::MissingCredential => "Authentication credentials were not provided",
            Self::MalformedHeader => "Invalid token header",
            Self::Malformed => "Invalid token",
            Self::Expired => "Token has expired",
            Self::WrongTokenClass => "Invalid token type",
            Self::PrincipalNotFound => "User not found",
            Self::IncorrectPassword => "Incorrect password",
            Self::InactiveAccount => "User account is inactive",
            Self::Forbidden => "You do not have permission to perform this action",
            Self::Store(_) => "Internal server error",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Store(err) = &self {
            error!("Auth store failure: {err:#}");
        }
        error_response(self.status(), self.code(), self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failures_are_401() {
        for err in [
            AuthError::MissingCredential,
            AuthError::MalformedHeader,
            AuthError::Malformed,
            AuthError::Expired,
            AuthError::WrongTokenClass,
            AuthError::IncorrectPassword,
        ] {
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED, "{err}");
        }
    }

    #[test]
    fn role_denial_is_distinct_from_authentication_failure() {
        assert_eq!(AuthError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::InactiveAccount.status(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::PrincipalNotFound.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn token_errors_map_to_auth_errors() {
        assert!(matches!(
            AuthError::from(TokenError::Malformed),
            AuthError::Malformed
        ));
        assert!(matches!(
            AuthError::from(TokenError::Expired),
            AuthError::Expired
        ));
        assert!(matches!(
            AuthError::from(TokenError::Key),
            AuthError::Store(_)
        ));
    }
}
