//! Gateway webhook: signed outcome notifications.
//!
//! Paystack signs the raw body with HMAC-SHA512 keyed by the secret key and
//! sends the hex digest in `x-paystack-signature`. `charge.success` settles the
//! referenced transaction as completed and `charge.failed` as failed; any other
//! event is acknowledged and ignored.

use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::sync::Arc;
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{error::PaymentError, state::PaymentState, types::SettlementStatus};
use crate::api::handlers::error::{error_response, ErrorBody};

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Deserialize, Debug)]
struct WebhookEvent {
    event: String,
    #[serde(default)]
    data: WebhookData,
}

#[derive(Deserialize, Debug, Default)]
struct WebhookData {
    #[serde(default)]
    reference: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct WebhookAck {
    pub message: String,
}

/// Check `signature` (hex) against the HMAC-SHA512 of `body`.
#[must_use]
pub fn verify_signature(secret: &SecretString, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.expose_secret().as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex HMAC-SHA512 of `body`, as the gateway computes it.
#[must_use]
pub fn sign(secret: &SecretString, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha512::new_from_slice(secret.expose_secret().as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

fn settlement_for(event: &str) -> Option<SettlementStatus> {
    match event {
        "charge.success" => Some(SettlementStatus::Completed),
        "charge.failed" => Some(SettlementStatus::Failed),
        _ => None,
    }
}

#[utoipa::path(
    post,
    path = "/v1/payments/webhook",
    request_body(content = String, description = "Raw gateway event"),
    params(
        ("x-paystack-signature" = String, Header, description = "Hex HMAC-SHA512 of the body")
    ),
    responses(
        (status = 200, description = "Event applied or ignored", body = WebhookAck),
        (status = 401, description = "Missing or invalid signature", body = ErrorBody),
        (status = 404, description = "Unknown transaction", body = ErrorBody),
        (status = 409, description = "Conflicting outcome", body = ErrorBody),
    ),
    tag = "payments"
)]
pub async fn webhook(
    headers: HeaderMap,
    payment_state: Extension<Arc<PaymentState>>,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if signature.is_empty() || !verify_signature(payment_state.webhook_secret(), &body, signature)
    {
        warn!("Rejected webhook with missing or invalid signature");
        return error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_signature",
            "Invalid webhook signature",
        );
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            debug!("Invalid webhook payload: {err}");
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_payload",
                "Invalid webhook payload",
            );
        }
    };

    let Some(outcome) = settlement_for(&event.event) else {
        debug!("Ignoring webhook event {}", event.event);
        return (
            StatusCode::OK,
            Json(WebhookAck {
                message: format!("Event {} ignored", event.event),
            }),
        )
            .into_response();
    };

    let Ok(transaction_id) = Uuid::parse_str(&event.data.reference) else {
        return PaymentError::UnknownTransaction.into_response();
    };

    match payment_state
        .flow()
        .reconcile(transaction_id, outcome)
        .await
    {
        Ok(transaction) => (
            StatusCode::OK,
            Json(WebhookAck {
                message: format!("Transaction {}", transaction.status.as_str()),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
