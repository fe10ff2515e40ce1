//! Donation, transaction lookup and reconcile endpoints.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{
    error::PaymentError,
    state::PaymentState,
    types::{DonationInput, GatewayHandoff, ReconcileRequest, Transaction},
};
use crate::api::handlers::{
    auth::{policy::require, policy::RequiredRole, AuthState},
    error::{ErrorBody, ValidationError},
};

#[utoipa::path(
    post,
    path = "/v1/donations",
    request_body = DonationInput,
    responses(
        (status = 201, description = "Transaction opened; continue at authorization_url", body = GatewayHandoff),
        (status = 400, description = "Invalid donation", body = ErrorBody),
        (status = 401, description = "A bearer token was sent but is invalid", body = ErrorBody),
        (status = 502, description = "Gateway rejected the transaction", body = ErrorBody),
        (status = 504, description = "Gateway timed out", body = ErrorBody),
    ),
    tag = "payments"
)]
pub async fn create_donation(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payment_state: Extension<Arc<PaymentState>>,
    payload: Option<Json<DonationInput>>,
) -> Response {
    // Anonymous donors are welcome; a signed-in donor is attached to the donation.
    let principal = match require(&headers, &auth_state, RequiredRole::Anonymous).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let Some(Json(input)) = payload else {
        return ValidationError::field("amount", "Amount is required").into_response();
    };

    match payment_state
        .flow()
        .initiate(&input, principal.map(|principal| principal.id))
        .await
    {
        Ok(handoff) => (StatusCode::CREATED, Json(handoff)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/transactions/{id}",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction", body = Transaction),
        (status = 401, description = "Not signed in", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody),
        (status = 404, description = "Unknown transaction", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "payments"
)]
pub async fn get_transaction(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    auth_state: Extension<Arc<AuthState>>,
    payment_state: Extension<Arc<PaymentState>>,
) -> Response {
    if let Err(err) = require(&headers, &auth_state, RequiredRole::Admin).await {
        return err.into_response();
    }

    match payment_state.flow().transaction(id).await {
        Ok(transaction) => (StatusCode::OK, Json(transaction)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/transactions/{id}/reconcile",
    params(("id" = Uuid, Path, description = "Transaction id")),
    request_body = ReconcileRequest,
    responses(
        (status = 200, description = "Transaction after reconciliation", body = Transaction),
        (status = 401, description = "Not signed in", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody),
        (status = 404, description = "Unknown transaction", body = ErrorBody),
        (status = 409, description = "Conflicting outcome", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "payments"
)]
pub async fn reconcile_transaction(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    auth_state: Extension<Arc<AuthState>>,
    payment_state: Extension<Arc<PaymentState>>,
    payload: Option<Json<ReconcileRequest>>,
) -> Response {
    if let Err(err) = require(&headers, &auth_state, RequiredRole::Admin).await {
        return err.into_response();
    }

    let Some(Json(request)) = payload else {
        return PaymentError::from(ValidationError::field(
            "status",
            "Status must be one of: completed, failed",
        ))
        .into_response();
    };

    match payment_state.flow().reconcile(id, request.status).await {
        Ok(transaction) => (StatusCode::OK, Json(transaction)).into_response(),
        Err(err) => err.into_response(),
    }
}
