//! Donation and transaction records plus request/response types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Created,
    PendingGateway,
    Completed,
    Failed,
}

impl TransactionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::PendingGateway => "pending_gateway",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(Self::Created),
            "pending_gateway" => Some(Self::PendingGateway),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Allowed one-way moves; nothing leaves a terminal state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::PendingGateway | Self::Failed)
                | (Self::PendingGateway, Self::Completed | Self::Failed)
        )
    }
}

/// Terminal outcome reported by the gateway or an operator.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Completed,
    Failed,
}

impl From<SettlementStatus> for TransactionStatus {
    fn from(status: SettlementStatus) -> Self {
        match status {
            SettlementStatus::Completed => Self::Completed,
            SettlementStatus::Failed => Self::Failed,
        }
    }
}

/// Donation form as submitted by the donor.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default)]
pub struct DonationInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[schema(value_type = Option<String>, example = "2500.00")]
    pub amount: Option<Decimal>,
    pub cause_id: Option<i64>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DonationRequest {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[schema(value_type = String, example = "2500.00")]
    pub amount: Decimal,
    pub cause_id: i64,
    pub principal_id: Option<Uuid>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: Uuid,
    pub donation_id: Uuid,
    #[schema(value_type = String, example = "2500.00")]
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub gateway_reference: Option<String>,
    pub authorization_url: Option<String>,
    pub failure_reason: Option<String>,
}

impl Transaction {
    /// Open a fresh transaction for `donation`; the amount always comes from the donation.
    #[must_use]
    pub fn open(donation: &DonationRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            donation_id: donation.id,
            amount: donation.amount,
            status: TransactionStatus::Created,
            gateway_reference: None,
            authorization_url: None,
            failure_reason: None,
        }
    }
}

/// Fields written by a status transition; `None` leaves the stored value as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub status: TransactionStatus,
    pub gateway_reference: Option<String>,
    pub authorization_url: Option<String>,
    pub failure_reason: Option<String>,
}

impl Transition {
    #[must_use]
    pub fn to(status: TransactionStatus) -> Self {
        Self {
            status,
            gateway_reference: None,
            authorization_url: None,
            failure_reason: None,
        }
    }

    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            failure_reason: Some(reason.into()),
            ..Self::to(TransactionStatus::Failed)
        }
    }

    /// Apply to an in-memory copy of the row.
    pub fn apply(&self, transaction: &mut Transaction) {
        transaction.status = self.status;
        if let Some(reference) = &self.gateway_reference {
            transaction.gateway_reference = Some(reference.clone());
        }
        if let Some(url) = &self.authorization_url {
            transaction.authorization_url = Some(url.clone());
        }
        if let Some(reason) = &self.failure_reason {
            transaction.failure_reason = Some(reason.clone());
        }
    }
}

/// What the donor needs to continue at the gateway.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GatewayHandoff {
    pub transaction_id: Uuid,
    pub authorization_url: String,
    pub gateway_reference: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ReconcileRequest {
    pub status: SettlementStatus,
}
