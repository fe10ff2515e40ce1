use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use super::types::TransactionStatus;
use crate::api::handlers::error::{error_response, ValidationError};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("unknown transaction")]
    UnknownTransaction,
    #[error("transaction is {current:?}, cannot settle as {requested:?}")]
    ReconciliationConflict {
        current: TransactionStatus,
        requested: TransactionStatus,
    },
    #[error("gateway error: {0}")]
    GatewayError(String),
    #[error("gateway timed out")]
    GatewayTimeout,
    #[error("store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl PaymentError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::UnknownTransaction => StatusCode::NOT_FOUND,
            Self::ReconciliationConflict { .. } => StatusCode::CONFLICT,
            Self::GatewayError(_) => StatusCode::BAD_GATEWAY,
            Self::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(validation) => validation.into_response(),
            Self::UnknownTransaction => error_response(
                self.status(),
                "unknown_transaction",
                "Transaction not found",
            ),
            Self::ReconciliationConflict { current, requested } => error_response(
                StatusCode::CONFLICT,
                "reconciliation_conflict",
                format!(
                    "Transaction is {}, cannot settle as {}",
                    current.as_str(),
                    requested.as_str()
                ),
            ),
            Self::GatewayError(ref reason) => {
                error_response(self.status(), "gateway_error", reason.clone())
            }
            Self::GatewayTimeout => error_response(
                self.status(),
                "gateway_timeout",
                "Payment gateway did not respond in time",
            ),
            Self::Store(err) => {
                error!("Payment store failure: {err:#}");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        }
    }
}
