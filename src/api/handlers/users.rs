//! User registration and the admin user list.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use super::{
    auth::{
        hash_password, normalize_email,
        policy::{require, RequiredRole},
        storage::{NewPrincipal, RegisterOutcome},
        types::Principal,
        valid_email, AuthState,
    },
    error::{error_response, ErrorBody, ValidationError},
};

const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct UserRegister {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub password: String,
}

/// Field-level checks; returns the normalized email on success.
fn validate_registration(user: &UserRegister) -> Result<String, ValidationError> {
    let mut errors = ValidationError::new();
    let blank = "This field may not be blank.";

    if user.username.trim().is_empty() {
        errors.add("username", blank);
    }
    if user.first_name.trim().is_empty() {
        errors.add("first_name", blank);
    }
    if user.last_name.trim().is_empty() {
        errors.add("last_name", blank);
    }

    let email = normalize_email(&user.email);
    if email.is_empty() {
        errors.add("email", blank);
    } else if !valid_email(&email) {
        errors.add("email", "Enter a valid email address.");
    }

    if user.password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.add(
            "password",
            format!("Ensure this field has at least {MIN_PASSWORD_LENGTH} characters."),
        );
    }

    errors.into_result().map(|()| email)
}

#[utoipa::path(
    post,
    path = "/v1/users/register",
    request_body = UserRegister,
    responses(
        (status = 201, description = "Registration successful", body = Principal),
        (status = 400, description = "Invalid fields, or email/username already taken", body = ErrorBody),
    ),
    tag = "users"
)]
#[instrument(skip(auth_state, payload))]
pub async fn register(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UserRegister>>,
) -> Response {
    let user = payload.map(|Json(user)| user).unwrap_or_default();

    let email = match validate_registration(&user) {
        Ok(email) => email,
        Err(validation) => return validation.into_response(),
    };

    let password_hash = match hash_password(&user.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err:#}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let new_principal = NewPrincipal {
        username: user.username.trim().to_string(),
        email,
        first_name: user.first_name.trim().to_string(),
        last_name: user.last_name.trim().to_string(),
        password_hash,
    };

    match auth_state.principals().insert(new_principal).await {
        Ok(RegisterOutcome::Created(principal)) => {
            info!(user_id = %principal.id, "User registered");
            (StatusCode::CREATED, Json(principal)).into_response()
        }
        Ok(RegisterOutcome::DuplicateEmail) => {
            ValidationError::field("email", "A user with that email already exists.")
                .into_response()
        }
        Ok(RegisterOutcome::DuplicateUsername) => {
            ValidationError::field("username", "A user with that username already exists.")
                .into_response()
        }
        Err(err) => {
            error!("Failed to register user: {err:#}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            )
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/users",
    responses(
        (status = 200, description = "All users", body = [Principal]),
        (status = 401, description = "Not signed in", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody),
        (status = 404, description = "No users found", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn list_users(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    if let Err(err) = require(&headers, &auth_state, RequiredRole::Admin).await {
        return err.into_response();
    }

    match auth_state.principals().list().await {
        Ok(users) if users.is_empty() => {
            error_response(StatusCode::NOT_FOUND, "not_found", "No users found")
        }
        Ok(users) => (StatusCode::OK, Json(users)).into_response(),
        Err(err) => {
            error!("Failed to list users: {err:#}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserRegister {
        UserRegister {
            username: "ada".to_string(),
            email: " Ada@GiveAid.com ".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            password: "correct horse".to_string(),
        }
    }

    #[test]
    fn valid_registration_normalizes_email() {
        assert_eq!(
            validate_registration(&user()).ok().as_deref(),
            Some("ada@giveaid.com")
        );
    }

    #[test]
    fn short_password_is_rejected() {
        let mut user = user();
        user.password = "short".to_string();
        assert!(validate_registration(&user).is_err_and(|err| err.has("password")));
    }

    #[test]
    fn blank_fields_are_reported_together() {
        let result = validate_registration(&UserRegister::default());
        let err = result.err().unwrap_or_default();
        for field in ["username", "email", "first_name", "last_name", "password"] {
            assert!(err.has(field), "missing {field}");
        }
    }

    #[test]
    fn malformed_email_is_rejected() {
        let mut user = user();
        user.email = "ada-at-giveaid".to_string();
        assert!(validate_registration(&user).is_err_and(|err| err.has("email")));
    }
}
