use crate::api::handlers::{
    auth::{self, session},
    catalog::{self, CatalogStore, PgCatalogStore},
    error, health,
    payments::{self, donations, webhook},
    users,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{delete, get, post},
    Extension, Router,
};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
pub mod receipt;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        session::login,
        session::refresh,
        session::logout,
        users::register,
        users::list_users,
        catalog::list_causes,
        catalog::create_cause,
        catalog::delete_cause,
        catalog::list_stories,
        donations::create_donation,
        donations::get_transaction,
        donations::reconcile_transaction,
        webhook::webhook,
    ),
    components(schemas(
        error::ErrorBody,
        health::Health,
        auth::types::Principal,
        auth::types::LoginRequest,
        auth::types::RefreshRequest,
        auth::types::TokenPair,
        auth::types::LogoutResponse,
        users::UserRegister,
        catalog::Cause,
        catalog::NewCause,
        catalog::SuccessStory,
        payments::types::DonationInput,
        payments::types::GatewayHandoff,
        payments::types::ReconcileRequest,
        payments::types::SettlementStatus,
        payments::types::Transaction,
        payments::types::TransactionStatus,
        webhook::WebhookAck,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "giveaid", description = "Donation management API"),
        (name = "auth", description = "Sign in, token refresh and sign out"),
        (name = "users", description = "Registration and user listing"),
        (name = "catalog", description = "Causes and success stories"),
        (name = "payments", description = "Donations, transactions and gateway webhooks"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// All routes, without state; callers add the `Extension` layers.
#[must_use]
pub fn router() -> Router {
    Router::new()
        .route("/health", get(health::health).options(health::health))
        .route("/v1/auth/login", post(session::login))
        .route("/v1/auth/refresh", post(session::refresh))
        .route("/v1/auth/logout", post(session::logout))
        .route("/v1/users", get(users::list_users))
        .route("/v1/users/register", post(users::register))
        .route(
            "/v1/causes",
            get(catalog::list_causes).post(catalog::create_cause),
        )
        .route("/v1/causes/:id", delete(catalog::delete_cause))
        .route("/v1/stories", get(catalog::list_stories))
        .route("/v1/donations", post(donations::create_donation))
        .route("/v1/transactions/:id", get(donations::get_transaction))
        .route(
            "/v1/transactions/:id/reconcile",
            post(donations::reconcile_transaction),
        )
        .route("/v1/payments/webhook", post(webhook::webhook))
        .merge(SwaggerUi::new("/docs").url("/openapi.json", openapi()))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    auth_config: auth::AuthConfig,
    jwt_secret: SecretString,
    gateway_config: payments::GatewayConfig,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let principals = Arc::new(auth::PgPrincipalStore::new(pool.clone()));
    let auth_state = Arc::new(auth::AuthState::new(auth_config, jwt_secret, principals));

    // The gateway signs webhooks with the same secret key used to call it.
    let webhook_secret = gateway_config.secret_key().clone();
    let gateway_timeout = gateway_config.timeout();
    let gateway = Arc::new(payments::PaystackGateway::new(gateway_config)?);
    let flow = payments::PaymentFlow::new(
        Arc::new(payments::PgTransactionStore::new(pool.clone())),
        gateway,
        Arc::new(receipt::LogReceiptSender),
        gateway_timeout,
    );
    let payment_state = Arc::new(payments::PaymentState::new(flow, webhook_secret));

    let catalog: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(pool.clone()));

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_origin(Any);

    let app = router().layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors)
            .layer(Extension(auth_state))
            .layer(Extension(payment_state))
            .layer(Extension(catalog))
            .layer(Extension(pool)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
