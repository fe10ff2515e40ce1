//! Payment initiation and reconciliation.
//!
//! Every `initiate` call opens exactly one new transaction:
//!
//! ```text
//! created ──gateway accepts──▶ pending_gateway ──reconcile──▶ completed | failed
//!    └────gateway rejects / times out──▶ failed
//! ```
//!
//! The gateway is called once per transaction and never retried here; a
//! resubmission is a new donation with a new transaction id. Status changes are
//! compare-and-set on the stored status, so concurrent reconciles of the same
//! transaction serialize on the row.

use std::{sync::Arc, time::Duration};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{
    error::PaymentError,
    gateway::{self, GatewayMetadata, OpenTransaction, PaymentGateway},
    storage::TransactionStore,
    types::{
        DonationInput, DonationRequest, GatewayHandoff, SettlementStatus, Transaction,
        TransactionStatus, Transition,
    },
    validation::{to_minor_units, validate_donation},
};
use crate::api::{
    handlers::error::ValidationError,
    receipt::{spawn_receipt, ReceiptSender},
};

pub struct PaymentFlow {
    store: Arc<dyn TransactionStore>,
    gateway: Arc<dyn PaymentGateway>,
    receipts: Arc<dyn ReceiptSender>,
    gateway_timeout: Duration,
}

impl PaymentFlow {
    #[must_use]
    pub fn new(
        store: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PaymentGateway>,
        receipts: Arc<dyn ReceiptSender>,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            receipts,
            gateway_timeout,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn TransactionStore> {
        &self.store
    }

    /// Validate a donation, persist it with a fresh transaction and open it with the gateway.
    ///
    /// # Errors
    /// - `Validation` with field-level reasons; nothing is persisted.
    /// - `GatewayError` when the gateway rejects or cannot be reached; the transaction is `failed`.
    /// - `GatewayTimeout` when the gateway does not answer in time; the transaction is `failed`.
    /// - `Store` on persistence failures.
    #[instrument(skip(self, input), fields(cause_id = ?input.cause_id))]
    pub async fn initiate(
        &self,
        input: &DonationInput,
        principal_id: Option<Uuid>,
    ) -> Result<GatewayHandoff, PaymentError> {
        let cause_title = match input.cause_id {
            Some(cause_id) => self.store.cause_title(cause_id).await?,
            None => None,
        };
        let valid = validate_donation(input, cause_title.is_some())?;
        let amount_minor = to_minor_units(valid.amount)
            .ok_or_else(|| ValidationError::field("amount", "Amount is too large"))?;

        let donation = DonationRequest {
            id: Uuid::new_v4(),
            name: valid.name,
            email: valid.email,
            amount: valid.amount,
            cause_id: valid.cause_id,
            principal_id,
        };
        let transaction = Transaction::open(&donation);
        self.store.insert_donation(&donation, &transaction).await?;

        info!(transaction_id = %transaction.id, "Opening transaction with gateway");

        let request = OpenTransaction {
            amount_minor,
            email: donation.email.clone(),
            reference: transaction.id,
            metadata: GatewayMetadata {
                donor_name: donation.name.clone(),
                cause: cause_title.unwrap_or_default(),
            },
        };

        let outcome = tokio::time::timeout(
            self.gateway_timeout,
            self.gateway.open_transaction(&request),
        )
        .await;

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) if !gateway::is_timeout(&err) => {
                error!(transaction_id = %transaction.id, "Payment gateway unreachable: {err:#}");
                let reason = format!("{err:#}");
                let outcome = PaymentError::GatewayError(reason.clone());
                return Err(self.fail_created(transaction.id, &reason, outcome).await);
            }
            Err(_) | Ok(Err(_)) => {
                warn!(transaction_id = %transaction.id, "Payment gateway timed out");
                let outcome = PaymentError::GatewayTimeout;
                return Err(self
                    .fail_created(transaction.id, "gateway timed out", outcome)
                    .await);
            }
        };

        match (
            response.accepted,
            response.authorization_url,
            response.gateway_reference,
        ) {
            (true, Some(authorization_url), Some(gateway_reference)) => {
                let transition = Transition {
                    gateway_reference: Some(gateway_reference.clone()),
                    authorization_url: Some(authorization_url.clone()),
                    ..Transition::to(TransactionStatus::PendingGateway)
                };
                if !self
                    .store
                    .transition(transaction.id, TransactionStatus::Created, &transition)
                    .await?
                {
                    return Err(PaymentError::Store(anyhow::anyhow!(
                        "transaction {} left created before the gateway answered",
                        transaction.id
                    )));
                }

                Ok(GatewayHandoff {
                    transaction_id: transaction.id,
                    authorization_url,
                    gateway_reference,
                })
            }
            _ => {
                let reason = if response.message.is_empty() {
                    "gateway rejected the transaction".to_string()
                } else {
                    response.message
                };
                warn!(transaction_id = %transaction.id, "Payment gateway rejected: {reason}");
                let outcome = PaymentError::GatewayError(reason.clone());
                Err(self.fail_created(transaction.id, &reason, outcome).await)
            }
        }
    }

    /// Record a gateway failure on a `created` transaction and return the error to report.
    ///
    /// When the write itself fails the row stays `created` and the store error wins.
    async fn fail_created(&self, id: Uuid, reason: &str, outcome: PaymentError) -> PaymentError {
        match self
            .store
            .transition(id, TransactionStatus::Created, &Transition::failed(reason))
            .await
        {
            Ok(true) => outcome,
            Ok(false) => {
                warn!(
                    transaction_id = %id,
                    "Transaction no longer created, gateway failure not recorded: {outcome}"
                );
                outcome
            }
            Err(err) => {
                error!(
                    transaction_id = %id,
                    gateway_outcome = %outcome,
                    "Failed to record gateway failure: {err:#}"
                );
                PaymentError::Store(err)
            }
        }
    }

    /// # Errors
    /// `UnknownTransaction` when the id is not found.
    pub async fn transaction(&self, id: Uuid) -> Result<Transaction, PaymentError> {
        self.store
            .find_transaction(id)
            .await?
            .ok_or(PaymentError::UnknownTransaction)
    }

    /// Settle a transaction with the gateway's reported outcome.
    ///
    /// Settling with the outcome already recorded is a no-op returning the
    /// current state. A different outcome, or a transaction the gateway never
    /// accepted, is a conflict and leaves the row untouched.
    ///
    /// # Errors
    /// `UnknownTransaction`, `ReconciliationConflict`, or `Store`.
    #[instrument(skip(self))]
    pub async fn reconcile(
        &self,
        id: Uuid,
        outcome: SettlementStatus,
    ) -> Result<Transaction, PaymentError> {
        let requested = TransactionStatus::from(outcome);

        loop {
            let mut transaction = self.transaction(id).await?;

            match transaction.status {
                current if current == requested => return Ok(transaction),
                TransactionStatus::PendingGateway => {
                    let transition = Transition::to(requested);
                    if !self
                        .store
                        .transition(id, TransactionStatus::PendingGateway, &transition)
                        .await?
                    {
                        // Another reconcile won; judge against what it wrote.
                        continue;
                    }

                    transition.apply(&mut transaction);
                    info!(status = requested.as_str(), "Transaction settled");

                    if requested == TransactionStatus::Completed {
                        spawn_receipt(
                            self.store.clone(),
                            self.receipts.clone(),
                            transaction.clone(),
                        );
                    }
                    return Ok(transaction);
                }
                current => {
                    return Err(PaymentError::ReconciliationConflict { current, requested });
                }
            }
        }
    }
}
