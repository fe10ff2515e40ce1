//! Login, refresh and logout.
//!
//! Tokens are stateless: a login never consults or invalidates earlier
//! sessions, a refresh issues a brand-new pair while the old refresh token
//! stays valid until its own expiry, and logout only clears the client-side
//! cookie. Nothing here touches the signing secret.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::{
    error::AuthError,
    state::{AuthConfig, AuthState, ACCESS_TOKEN_COOKIE_NAME},
    token::{now_unix_seconds, TokenClass},
    types::{LoginRequest, LogoutResponse, RefreshRequest, TokenPair},
    utils::normalize_email,
};
use crate::api::handlers::error::{ErrorBody, ValidationError};

impl AuthState {
    /// Check a password login and issue a fresh token pair.
    ///
    /// # Errors
    /// `PrincipalNotFound`, `IncorrectPassword` and `InactiveAccount`, checked in that order.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        now: i64,
    ) -> Result<TokenPair, AuthError> {
        let email = normalize_email(identifier);
        let record = self
            .principals()
            .find_by_identifier(&email)
            .await?
            .ok_or(AuthError::PrincipalNotFound)?;

        if !self
            .principals()
            .verify_password(password, &record.password_hash)
        {
            return Err(AuthError::IncorrectPassword);
        }

        if !record.principal.is_active {
            return Err(AuthError::InactiveAccount);
        }

        self.issue_pair(record.principal.id, now)
    }

    /// Exchange a refresh token for a brand-new pair.
    ///
    /// # Errors
    /// Verification errors for the presented token (`Expired`, `Malformed`,
    /// `WrongTokenClass`) and `PrincipalNotFound` if the subject vanished.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str, now: i64) -> Result<TokenPair, AuthError> {
        let principal = self
            .verifier()
            .verify_at(refresh_token, TokenClass::Refresh, now)
            .await?;

        self.issue_pair(principal.id, now)
    }

    fn issue_pair(&self, subject: uuid::Uuid, now: i64) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.codec().issue(subject, TokenClass::Access, now)?,
            refresh_token: self.codec().issue(subject, TokenClass::Refresh, now)?,
        })
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; access_token cookie set", body = TokenPair),
        (status = 400, description = "Missing email or password", body = ErrorBody),
        (status = 401, description = "Incorrect password", body = ErrorBody),
        (status = 403, description = "Inactive account", body = ErrorBody),
        (status = 404, description = "Unknown email", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        let mut validation = ValidationError::new();
        validation.add("email", "This field is required.");
        validation.add("password", "This field is required.");
        return validation.into_response();
    };

    let mut validation = ValidationError::new();
    if request.email.trim().is_empty() {
        validation.add("email", "This field is required.");
    }
    if request.password.is_empty() {
        validation.add("password", "This field is required.");
    }
    if let Err(validation) = validation.into_result() {
        return validation.into_response();
    }

    let pair = match auth_state
        .login(&request.email, &request.password, now_unix_seconds())
        .await
    {
        Ok(pair) => pair,
        Err(err) => return err.into_response(),
    };

    let mut headers = HeaderMap::new();
    match access_token_cookie(auth_state.config(), &pair.access_token) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build access token cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    info!("User signed in");
    (StatusCode::OK, headers, Json(pair)).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Missing, expired or invalid refresh token", body = ErrorBody),
        (status = 404, description = "User no longer exists", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn refresh(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> Response {
    let token = payload
        .and_then(|Json(request)| request.refresh_token)
        .filter(|token| !token.is_empty());
    let Some(token) = token else {
        return AuthError::MissingCredential.into_response();
    };

    match auth_state.refresh(&token, now_unix_seconds()).await {
        Ok(pair) => (StatusCode::OK, Json(pair)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 200, description = "access_token cookie cleared", body = LogoutResponse)
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    let message = if has_access_token_cookie(&headers) {
        "Logged Out Successfully"
    } else {
        "User is already logged out"
    };

    // Always clear the cookie, even if none was sent.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_access_token_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        Json(LogoutResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Build the `HttpOnly` cookie carrying the access token.
pub(super) fn access_token_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = config.access_cookie_max_age();
    let mut cookie = format!(
        "{ACCESS_TOKEN_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_access_token_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{ACCESS_TOKEN_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn has_access_token_cookie(headers: &HeaderMap) -> bool {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(key, value)| key.trim() == ACCESS_TOKEN_COOKIE_NAME && !value.trim().is_empty())
}
