//! Causes and success stories.
//!
//! Causes are deleted only through [`CatalogStore::delete_cause`]: a cause that
//! has received any donation is kept (donations and transactions are never
//! deleted), otherwise it goes together with its success stories.

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{error, info, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    auth::{policy::require, policy::RequiredRole, AuthState},
    error::{error_response, ErrorBody, ValidationError},
};

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Cause {
    pub id: i64,
    pub title: String,
    pub description: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SuccessStory {
    pub id: i64,
    pub user_id: Uuid,
    pub cause_id: i64,
    pub title: String,
    pub description: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct NewCause {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteCauseOutcome {
    Deleted,
    NotFound,
    InUse,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_causes(&self) -> Result<Vec<Cause>>;

    async fn insert_cause(&self, cause: &NewCause) -> Result<Cause>;

    /// Delete a cause with its stories unless it has donations.
    async fn delete_cause(&self, id: i64) -> Result<DeleteCauseOutcome>;

    async fn list_stories(&self) -> Result<Vec<SuccessStory>>;
}

#[derive(Clone, Debug)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn list_causes(&self) -> Result<Vec<Cause>> {
        let query = "SELECT id, title, description FROM causes ORDER BY id";
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
            .context("failed to list causes")?;

        Ok(rows
            .iter()
            .map(|row| Cause {
                id: row.get("id"),
                title: row.get("title"),
                description: row.get("description"),
            })
            .collect())
    }

    async fn insert_cause(&self, cause: &NewCause) -> Result<Cause> {
        let query = "INSERT INTO causes (title, description) VALUES ($1, $2) RETURNING id";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(cause.title.trim())
            .bind(cause.description.trim())
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert cause")?;

        Ok(Cause {
            id: row.get("id"),
            title: cause.title.trim().to_string(),
            description: cause.description.trim().to_string(),
        })
    }

    async fn delete_cause(&self, id: i64) -> Result<DeleteCauseOutcome> {
        let mut tx = self.pool.begin().await.context("begin cause deletion")?;

        // Row lock keeps a concurrent donation from slipping in between the check and the delete.
        let query = "SELECT id FROM causes WHERE id = $1 FOR UPDATE";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let cause = sqlx::query(query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await
            .context("failed to lock cause")?;
        if cause.is_none() {
            tx.rollback().await.context("rollback cause deletion")?;
            return Ok(DeleteCauseOutcome::NotFound);
        }

        let query = "SELECT EXISTS (SELECT 1 FROM donations WHERE cause_id = $1) AS in_use";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let in_use: bool = sqlx::query(query)
            .bind(id)
            .fetch_one(&mut *tx)
            .instrument(span)
            .await
            .context("failed to check cause donations")?
            .get("in_use");
        if in_use {
            tx.rollback().await.context("rollback cause deletion")?;
            return Ok(DeleteCauseOutcome::InUse);
        }

        let query = "DELETE FROM success_stories WHERE cause_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to delete success stories")?;

        let query = "DELETE FROM causes WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to delete cause")?;

        tx.commit().await.context("commit cause deletion")?;

        Ok(DeleteCauseOutcome::Deleted)
    }

    async fn list_stories(&self) -> Result<Vec<SuccessStory>> {
        let query = r"
            SELECT id, user_id, cause_id, title, description
            FROM success_stories
            ORDER BY id
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
            .context("failed to list success stories")?;

        Ok(rows
            .iter()
            .map(|row| SuccessStory {
                id: row.get("id"),
                user_id: row.get("user_id"),
                cause_id: row.get("cause_id"),
                title: row.get("title"),
                description: row.get("description"),
            })
            .collect())
    }
}

fn store_failure(err: &anyhow::Error) -> Response {
    error!("Catalog store failure: {err:#}");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Internal server error",
    )
}

#[utoipa::path(
    get,
    path = "/v1/causes",
    responses(
        (status = 200, description = "All causes", body = [Cause])
    ),
    tag = "catalog"
)]
pub async fn list_causes(catalog: Extension<Arc<dyn CatalogStore>>) -> Response {
    match catalog.list_causes().await {
        Ok(causes) => (StatusCode::OK, Json(causes)).into_response(),
        Err(err) => store_failure(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/causes",
    request_body = NewCause,
    responses(
        (status = 201, description = "Cause created", body = Cause),
        (status = 400, description = "Missing title or description", body = ErrorBody),
        (status = 401, description = "Not signed in", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "catalog"
)]
pub async fn create_cause(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    catalog: Extension<Arc<dyn CatalogStore>>,
    payload: Option<Json<NewCause>>,
) -> Response {
    if let Err(err) = require(&headers, &auth_state, RequiredRole::Admin).await {
        return err.into_response();
    }

    let cause = payload.map(|Json(cause)| cause).unwrap_or_default();
    let mut validation = ValidationError::new();
    if cause.title.trim().is_empty() {
        validation.add("title", "This field may not be blank.");
    }
    if cause.description.trim().is_empty() {
        validation.add("description", "This field may not be blank.");
    }
    if let Err(validation) = validation.into_result() {
        return validation.into_response();
    }

    match catalog.insert_cause(&cause).await {
        Ok(cause) => {
            info!(cause_id = cause.id, "Cause created");
            (StatusCode::CREATED, Json(cause)).into_response()
        }
        Err(err) => store_failure(&err),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/causes/{id}",
    params(("id" = i64, Path, description = "Cause id")),
    responses(
        (status = 204, description = "Cause and its success stories deleted"),
        (status = 401, description = "Not signed in", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody),
        (status = 404, description = "Unknown cause", body = ErrorBody),
        (status = 409, description = "Cause has donations", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "catalog"
)]
pub async fn delete_cause(
    headers: HeaderMap,
    Path(id): Path<i64>,
    auth_state: Extension<Arc<AuthState>>,
    catalog: Extension<Arc<dyn CatalogStore>>,
) -> Response {
    if let Err(err) = require(&headers, &auth_state, RequiredRole::Admin).await {
        return err.into_response();
    }

    match catalog.delete_cause(id).await {
        Ok(DeleteCauseOutcome::Deleted) => {
            info!(cause_id = id, "Cause deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(DeleteCauseOutcome::NotFound) => {
            error_response(StatusCode::NOT_FOUND, "not_found", "Cause not found")
        }
        Ok(DeleteCauseOutcome::InUse) => error_response(
            StatusCode::CONFLICT,
            "cause_in_use",
            "Cause has donations and cannot be deleted",
        ),
        Err(err) => store_failure(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/stories",
    responses(
        (status = 200, description = "All success stories", body = [SuccessStory])
    ),
    tag = "catalog"
)]
pub async fn list_stories(catalog: Extension<Arc<dyn CatalogStore>>) -> Response {
    match catalog.list_stories().await {
        Ok(stories) => (StatusCode::OK, Json(stories)).into_response(),
        Err(err) => store_failure(&err),
    }
}
