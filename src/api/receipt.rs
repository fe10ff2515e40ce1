//! Donation receipts.
//!
//! When a transaction first settles as `completed`, the payment flow spawns a
//! task that loads the donation, renders a receipt and hands it to a
//! `ReceiptSender`. The task never blocks the response; failures are logged and
//! dropped. The default sender is `LogReceiptSender`, which only logs.

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::api::handlers::payments::{storage::TransactionStore, types::Transaction};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_id: Uuid,
    pub to_email: String,
    pub donor_name: String,
    pub amount: Decimal,
    pub cause: String,
}

impl Receipt {
    #[must_use]
    pub fn subject(&self) -> &'static str {
        "Thank you for your donation"
    }

    #[must_use]
    pub fn body(&self) -> String {
        format!(
            "Dear {name},\n\nThank you for your donation of {amount} to {cause}.\n\nAmount: {amount}\nCause: {cause}\nReference: {reference}\n\nRegards,\nGiveAid Team\n",
            name = self.donor_name,
            amount = self.amount,
            cause = self.cause,
            reference = self.transaction_id,
        )
    }
}

/// Receipt delivery abstraction.
pub trait ReceiptSender: Send + Sync {
    /// Deliver a receipt or return an error (logged by the caller).
    fn send(&self, receipt: &Receipt) -> Result<()>;
}

/// Sender that logs the receipt instead of emailing it.
#[derive(Clone, Debug)]
pub struct LogReceiptSender;

impl ReceiptSender for LogReceiptSender {
    fn send(&self, receipt: &Receipt) -> Result<()> {
        info!(
            to_email = %receipt.to_email,
            transaction_id = %receipt.transaction_id,
            subject = receipt.subject(),
            "donation receipt send stub"
        );
        Ok(())
    }
}

async fn build_receipt(store: &dyn TransactionStore, transaction: &Transaction) -> Result<Receipt> {
    let donation = store
        .find_donation(transaction.donation_id)
        .await?
        .ok_or_else(|| anyhow!("donation {} not found", transaction.donation_id))?;
    let cause = store
        .cause_title(donation.cause_id)
        .await?
        .unwrap_or_else(|| format!("cause #{}", donation.cause_id));

    Ok(Receipt {
        transaction_id: transaction.id,
        to_email: donation.email,
        donor_name: donation.name,
        amount: transaction.amount,
        cause,
    })
}

/// Fire-and-forget receipt for a completed transaction.
pub fn spawn_receipt(
    store: Arc<dyn TransactionStore>,
    sender: Arc<dyn ReceiptSender>,
    transaction: Transaction,
) -> JoinHandle<()> {
    let span = info_span!("receipt.send", transaction_id = %transaction.id);
    tokio::spawn(
        async move {
            let result = match build_receipt(store.as_ref(), &transaction).await {
                Ok(receipt) => sender.send(&receipt),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                error!("Failed to send donation receipt: {err:#}");
            }
        }
        .instrument(span),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_mentions_amount_and_cause() {
        let receipt = Receipt {
            transaction_id: Uuid::new_v4(),
            to_email: "ada@giveaid.com".to_string(),
            donor_name: "Ada".to_string(),
            amount: Decimal::new(250_000, 2),
            cause: "Clean water".to_string(),
        };
        let body = receipt.body();
        assert!(body.starts_with("Dear Ada,"));
        assert!(body.contains("2500.00 to Clean water"));
        assert!(body.contains(&receipt.transaction_id.to_string()));
    }

    #[test]
    fn log_sender_accepts_everything() {
        let receipt = Receipt {
            transaction_id: Uuid::new_v4(),
            to_email: "ada@giveaid.com".to_string(),
            donor_name: "Ada".to_string(),
            amount: Decimal::ONE,
            cause: "Clean water".to_string(),
        };
        assert!(LogReceiptSender.send(&receipt).is_ok());
    }
}
