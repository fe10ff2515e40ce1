//! Principal store: lookups for the auth core, inserts and listing for user management.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::types::Principal;
use super::utils::{is_unique_violation, verify_password};

/// Principal plus the password hash needed to check a login.
#[derive(Debug, Clone)]
pub struct LoginRecord {
    pub principal: Principal,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
}

#[derive(Debug)]
pub enum RegisterOutcome {
    Created(Principal),
    DuplicateEmail,
    DuplicateUsername,
}

#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Look up a principal by normalized email.
    async fn find_by_identifier(&self, email: &str) -> Result<Option<LoginRecord>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>>;

    fn verify_password(&self, plaintext: &str, hash: &str) -> bool;

    async fn insert(&self, principal: NewPrincipal) -> Result<RegisterOutcome>;

    async fn list(&self) -> Result<Vec<Principal>>;
}

#[derive(Clone, Debug)]
pub struct PgPrincipalStore {
    pool: PgPool,
}

impl PgPrincipalStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn principal_from_row(row: &PgRow) -> Principal {
    Principal {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        is_admin: row.get("is_admin"),
        is_active: row.get("is_active"),
    }
}

#[async_trait]
impl PrincipalStore for PgPrincipalStore {
    async fn find_by_identifier(&self, email: &str) -> Result<Option<LoginRecord>> {
        let query = r"
            SELECT id, email, username, is_admin, is_active, password_hash
            FROM users
            WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup login record")?;

        Ok(row.map(|row| LoginRecord {
            principal: principal_from_row(&row),
            password_hash: row.get("password_hash"),
        }))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>> {
        let query = "SELECT id, email, username, is_admin, is_active FROM users WHERE id = $1";
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
            .context("failed to lookup principal")?;

        Ok(row.as_ref().map(principal_from_row))
    }

    fn verify_password(&self, plaintext: &str, hash: &str) -> bool {
        verify_password(plaintext, hash)
    }

    async fn insert(&self, principal: NewPrincipal) -> Result<RegisterOutcome> {
        let query = "SELECT email = $1 AS same_email FROM users WHERE email = $1 OR username = $2 LIMIT 1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let existing = sqlx::query(query)
            .bind(&principal.email)
            .bind(&principal.username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to check for existing user")?;

        if let Some(row) = existing {
            let same_email: bool = row.get("same_email");
            return Ok(if same_email {
                RegisterOutcome::DuplicateEmail
            } else {
                RegisterOutcome::DuplicateUsername
            });
        }

        let query = r"
            INSERT INTO users
                (username, email, first_name, last_name, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, username, is_admin, is_active
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&principal.username)
            .bind(&principal.email)
            .bind(&principal.first_name)
            .bind(&principal.last_name)
            .bind(&principal.password_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(RegisterOutcome::Created(principal_from_row(&row))),
            // Lost a race with a concurrent registration.
            Err(err) if is_unique_violation(&err) => {
                let on_email = match &err {
                    sqlx::Error::Database(db_err) => {
                        db_err.constraint().is_some_and(|name| name.contains("email"))
                    }
                    _ => false,
                };
                Ok(if on_email {
                    RegisterOutcome::DuplicateEmail
                } else {
                    RegisterOutcome::DuplicateUsername
                })
            }
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn list(&self) -> Result<Vec<Principal>> {
        let query = r"
            SELECT id, email, username, is_admin, is_active
            FROM users
            ORDER BY created_at, username
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list users")?;

        Ok(rows.iter().map(principal_from_row).collect())
    }
}
