//! Donation and transaction persistence.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::types::{DonationRequest, Transaction, TransactionStatus, Transition};

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Title of a cause, `None` when it does not exist.
    async fn cause_title(&self, cause_id: i64) -> Result<Option<String>>;

    /// Persist a donation and its `created` transaction atomically.
    async fn insert_donation(
        &self,
        donation: &DonationRequest,
        transaction: &Transaction,
    ) -> Result<()>;

    async fn find_donation(&self, id: Uuid) -> Result<Option<DonationRequest>>;

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>>;

    /// Compare-and-set: apply `transition` only while the row is still in `from`.
    ///
    /// Returns `false` when the row was not in `from` (or does not exist).
    /// Implementations refuse moves rejected by [`ensure_transition`].
    async fn transition(
        &self,
        id: Uuid,
        from: TransactionStatus,
        transition: &Transition,
    ) -> Result<bool>;
}

/// Reject status moves the lifecycle does not allow.
///
/// # Errors
/// Returns an error naming both statuses.
pub fn ensure_transition(from: TransactionStatus, to: TransactionStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(anyhow!(
            "illegal transaction status change: {} -> {}",
            from.as_str(),
            to.as_str()
        ))
    }
}

#[derive(Clone, Debug)]
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
    let status: String = row.get("status");
    Ok(Transaction {
        id: row.get("id"),
        donation_id: row.get("donation_id"),
        amount: row.get("amount"),
        status: TransactionStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown transaction status: {status}"))?,
        gateway_reference: row.get("gateway_reference"),
        authorization_url: row.get("authorization_url"),
        failure_reason: row.get("failure_reason"),
    })
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn cause_title(&self, cause_id: i64) -> Result<Option<String>> {
        let query = "SELECT title FROM causes WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(cause_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup cause")?;

        Ok(row.map(|row| row.get("title")))
    }

    async fn insert_donation(
        &self,
        donation: &DonationRequest,
        transaction: &Transaction,
    ) -> Result<()> {
        // Donation and transaction land together or not at all.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin donation transaction")?;

        let query = r"
            INSERT INTO donations
                (id, name, email, amount, cause_id, user_id)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(donation.id)
            .bind(&donation.name)
            .bind(&donation.email)
            .bind(donation.amount)
            .bind(donation.cause_id)
            .bind(donation.principal_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert donation")?;

        let query = r"
            INSERT INTO transactions
                (id, donation_id, amount, status)
            VALUES ($1, $2, $3, $4)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(transaction.id)
            .bind(transaction.donation_id)
            .bind(transaction.amount)
            .bind(transaction.status.as_str())
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert transaction")?;

        tx.commit().await.context("commit donation transaction")?;

        Ok(())
    }

    async fn find_donation(&self, id: Uuid) -> Result<Option<DonationRequest>> {
        let query = "SELECT id, name, email, amount, cause_id, user_id FROM donations WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup donation")?;

        Ok(row.map(|row| DonationRequest {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            amount: row.get("amount"),
            cause_id: row.get("cause_id"),
            principal_id: row.get("user_id"),
        }))
    }

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        let query = r"
            SELECT id, donation_id, amount, status, gateway_reference,
                   authorization_url, failure_reason
            FROM transactions
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup transaction")?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: TransactionStatus,
        transition: &Transition,
    ) -> Result<bool> {
        ensure_transition(from, transition.status)?;

        let query = r"
            UPDATE transactions
            SET status = $3,
                gateway_reference = COALESCE($4, gateway_reference),
                authorization_url = COALESCE($5, authorization_url),
                failure_reason = COALESCE($6, failure_reason),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(from.as_str())
            .bind(transition.status.as_str())
            .bind(transition.gateway_reference.as_deref())
            .bind(transition.authorization_url.as_deref())
            .bind(transition.failure_reason.as_deref())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update transaction status")?;

        Ok(result.rows_affected() == 1)
    }
}
