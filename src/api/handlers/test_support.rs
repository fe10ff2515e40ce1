//! In-memory stores and fakes shared by handler tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{Extension, Router};
use secrecy::SecretString;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};
use uuid::Uuid;

use super::{
    auth::{
        storage::{LoginRecord, NewPrincipal, RegisterOutcome},
        token::{now_unix_seconds, TokenClass},
        types::Principal,
        verify_password, AuthConfig, AuthState, PrincipalStore,
    },
    catalog::{Cause, CatalogStore, DeleteCauseOutcome, NewCause, SuccessStory},
    payments::{
        gateway::{GatewayResponse, OpenTransaction},
        storage::{ensure_transition, TransactionStore},
        types::{DonationRequest, Transaction, TransactionStatus, Transition},
        PaymentFlow, PaymentGateway, PaymentState,
    },
};
use crate::api::receipt::{Receipt, ReceiptSender};

pub(crate) const JWT_SECRET: &str = "giveaid-test-signing-secret-0123456789";
pub(crate) const WEBHOOK_SECRET: &str = "sk_test_giveaid_webhook";

/// Hashes starting with this prefix compare in plaintext, skipping argon2 in tests.
const PLAIN_HASH_PREFIX: &str = "plain$";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub(crate) struct MemoryPrincipalStore {
    users: Mutex<Vec<LoginRecord>>,
}

impl MemoryPrincipalStore {
    pub(crate) fn with_user(&self, email: &str, password: &str, is_admin: bool) -> Principal {
        let principal = Principal {
            id: Uuid::new_v4(),
            email: email.to_string(),
            username: email.split('@').next().unwrap_or(email).to_string(),
            is_admin,
            is_active: true,
        };
        lock(&self.users).push(LoginRecord {
            principal: principal.clone(),
            password_hash: format!("{PLAIN_HASH_PREFIX}{password}"),
        });
        principal
    }

    pub(crate) fn deactivate(&self, id: Uuid) {
        for record in lock(&self.users).iter_mut() {
            if record.principal.id == id {
                record.principal.is_active = false;
            }
        }
    }

    pub(crate) fn remove(&self, id: Uuid) {
        lock(&self.users).retain(|record| record.principal.id != id);
    }
}

#[async_trait]
impl PrincipalStore for MemoryPrincipalStore {
    async fn find_by_identifier(&self, email: &str) -> Result<Option<LoginRecord>> {
        Ok(lock(&self.users)
            .iter()
            .find(|record| record.principal.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>> {
        Ok(lock(&self.users)
            .iter()
            .find(|record| record.principal.id == id)
            .map(|record| record.principal.clone()))
    }

    fn verify_password(&self, plaintext: &str, hash: &str) -> bool {
        match hash.strip_prefix(PLAIN_HASH_PREFIX) {
            Some(stored) => stored == plaintext,
            None => verify_password(plaintext, hash),
        }
    }

    async fn insert(&self, principal: NewPrincipal) -> Result<RegisterOutcome> {
        let mut users = lock(&self.users);
        if users
            .iter()
            .any(|record| record.principal.email == principal.email)
        {
            return Ok(RegisterOutcome::DuplicateEmail);
        }
        if users
            .iter()
            .any(|record| record.principal.username == principal.username)
        {
            return Ok(RegisterOutcome::DuplicateUsername);
        }

        let created = Principal {
            id: Uuid::new_v4(),
            email: principal.email,
            username: principal.username,
            is_admin: false,
            is_active: true,
        };
        users.push(LoginRecord {
            principal: created.clone(),
            password_hash: principal.password_hash,
        });
        Ok(RegisterOutcome::Created(created))
    }

    async fn list(&self) -> Result<Vec<Principal>> {
        Ok(lock(&self.users)
            .iter()
            .map(|record| record.principal.clone())
            .collect())
    }
}

#[derive(Default)]
struct Tables {
    causes: Vec<Cause>,
    stories: Vec<SuccessStory>,
    donations: HashMap<Uuid, DonationRequest>,
    transactions: HashMap<Uuid, Transaction>,
    next_id: i64,
}

/// Donations, transactions and the catalog behind one lock.
#[derive(Default)]
pub(crate) struct MemoryStore {
    tables: Mutex<Tables>,
    fail_inserts: AtomicBool,
    fail_transitions: AtomicBool,
}

impl MemoryStore {
    pub(crate) fn with_cause(&self, title: &str) -> i64 {
        let mut tables = lock(&self.tables);
        tables.next_id += 1;
        let id = tables.next_id;
        tables.causes.push(Cause {
            id,
            title: title.to_string(),
            description: format!("{title} description"),
        });
        id
    }

    pub(crate) fn with_story(&self, user_id: Uuid, cause_id: i64, title: &str) -> i64 {
        let mut tables = lock(&self.tables);
        tables.next_id += 1;
        let id = tables.next_id;
        tables.stories.push(SuccessStory {
            id,
            user_id,
            cause_id,
            title: title.to_string(),
            description: None,
        });
        id
    }

    pub(crate) fn fail_inserts(&self) {
        self.fail_inserts.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_transitions(&self) {
        self.fail_transitions.store(true, Ordering::SeqCst);
    }

    pub(crate) fn transactions(&self) -> Vec<Transaction> {
        lock(&self.tables).transactions.values().cloned().collect()
    }

    pub(crate) fn donations(&self) -> Vec<DonationRequest> {
        lock(&self.tables).donations.values().cloned().collect()
    }

    pub(crate) fn stories(&self) -> Vec<SuccessStory> {
        lock(&self.tables).stories.clone()
    }

    /// Put a transaction in any status, bypassing the lifecycle.
    pub(crate) fn force_status(&self, id: Uuid, status: TransactionStatus) {
        if let Some(transaction) = lock(&self.tables).transactions.get_mut(&id) {
            transaction.status = status;
        }
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn cause_title(&self, cause_id: i64) -> Result<Option<String>> {
        Ok(lock(&self.tables)
            .causes
            .iter()
            .find(|cause| cause.id == cause_id)
            .map(|cause| cause.title.clone()))
    }

    async fn insert_donation(
        &self,
        donation: &DonationRequest,
        transaction: &Transaction,
    ) -> Result<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset"));
        }
        let mut tables = lock(&self.tables);
        if tables.transactions.contains_key(&transaction.id) {
            return Err(anyhow!("duplicate transaction id {}", transaction.id));
        }
        tables.donations.insert(donation.id, donation.clone());
        tables.transactions.insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn find_donation(&self, id: Uuid) -> Result<Option<DonationRequest>> {
        Ok(lock(&self.tables).donations.get(&id).cloned())
    }

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        Ok(lock(&self.tables).transactions.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: TransactionStatus,
        transition: &Transition,
    ) -> Result<bool> {
        ensure_transition(from, transition.status)?;
        if self.fail_transitions.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset"));
        }
        let mut tables = lock(&self.tables);
        match tables.transactions.get_mut(&id) {
            Some(transaction) if transaction.status == from => {
                transition.apply(transaction);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_causes(&self) -> Result<Vec<Cause>> {
        Ok(lock(&self.tables).causes.clone())
    }

    async fn insert_cause(&self, cause: &NewCause) -> Result<Cause> {
        let mut tables = lock(&self.tables);
        tables.next_id += 1;
        let created = Cause {
            id: tables.next_id,
            title: cause.title.trim().to_string(),
            description: cause.description.trim().to_string(),
        };
        tables.causes.push(created.clone());
        Ok(created)
    }

    async fn delete_cause(&self, id: i64) -> Result<DeleteCauseOutcome> {
        let mut tables = lock(&self.tables);
        if !tables.causes.iter().any(|cause| cause.id == id) {
            return Ok(DeleteCauseOutcome::NotFound);
        }
        if tables
            .donations
            .values()
            .any(|donation| donation.cause_id == id)
        {
            return Ok(DeleteCauseOutcome::InUse);
        }
        tables.stories.retain(|story| story.cause_id != id);
        tables.causes.retain(|cause| cause.id != id);
        Ok(DeleteCauseOutcome::Deleted)
    }

    async fn list_stories(&self) -> Result<Vec<SuccessStory>> {
        Ok(lock(&self.tables).stories.clone())
    }
}

#[derive(Debug, Clone)]
pub(crate) enum GatewayMode {
    Accept,
    Reject(String),
    Unreachable,
    Slow(Duration),
}

/// Scripted gateway that records every request it sees.
pub(crate) struct FakeGateway {
    mode: Mutex<GatewayMode>,
    requests: Mutex<Vec<OpenTransaction>>,
}

impl FakeGateway {
    pub(crate) fn new(mode: GatewayMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_mode(&self, mode: GatewayMode) {
        *lock(&self.mode) = mode;
    }

    pub(crate) fn requests(&self) -> Vec<OpenTransaction> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn open_transaction(&self, request: &OpenTransaction) -> Result<GatewayResponse> {
        lock(&self.requests).push(request.clone());
        let mode = lock(&self.mode).clone();
        match mode {
            GatewayMode::Accept => Ok(GatewayResponse {
                accepted: true,
                authorization_url: Some(format!(
                    "https://checkout.paystack.com/{}",
                    request.reference.simple()
                )),
                gateway_reference: Some(format!("ps_{}", request.reference.simple())),
                message: "Authorization URL created".to_string(),
            }),
            GatewayMode::Reject(message) => Ok(GatewayResponse {
                accepted: false,
                authorization_url: None,
                gateway_reference: None,
                message,
            }),
            GatewayMode::Unreachable => Err(anyhow!("connection refused")),
            GatewayMode::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Err(anyhow!("gateway answered too late"))
            }
        }
    }
}

/// Receipt sender that keeps what it was asked to send.
#[derive(Default)]
pub(crate) struct RecordingReceipts {
    sent: Mutex<Vec<Receipt>>,
    calls: AtomicUsize,
}

impl RecordingReceipts {
    pub(crate) fn sent(&self) -> Vec<Receipt> {
        lock(&self.sent).clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReceiptSender for RecordingReceipts {
    fn send(&self, receipt: &Receipt) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.sent).push(receipt.clone());
        Ok(())
    }
}

/// Fully wired application over in-memory stores.
pub(crate) struct TestApp {
    pub(crate) principals: Arc<MemoryPrincipalStore>,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) gateway: Arc<FakeGateway>,
    pub(crate) receipts: Arc<RecordingReceipts>,
    pub(crate) auth: Arc<AuthState>,
    pub(crate) payments: Arc<PaymentState>,
}

impl TestApp {
    pub(crate) fn new() -> Self {
        Self::with_gateway_timeout(Duration::from_secs(5))
    }

    pub(crate) fn with_gateway_timeout(timeout: Duration) -> Self {
        let principals = Arc::new(MemoryPrincipalStore::default());
        let store = Arc::new(MemoryStore::default());
        let gateway = Arc::new(FakeGateway::new(GatewayMode::Accept));
        let receipts = Arc::new(RecordingReceipts::default());

        let auth = Arc::new(AuthState::new(
            AuthConfig::new(),
            SecretString::from(JWT_SECRET),
            principals.clone(),
        ));
        let flow = PaymentFlow::new(store.clone(), gateway.clone(), receipts.clone(), timeout);
        let payments = Arc::new(PaymentState::new(
            flow,
            SecretString::from(WEBHOOK_SECRET),
        ));

        Self {
            principals,
            store,
            gateway,
            receipts,
            auth,
            payments,
        }
    }

    pub(crate) fn router(&self) -> Router {
        let catalog: Arc<dyn CatalogStore> = self.store.clone();
        crate::api::router()
            .layer(Extension(self.auth.clone()))
            .layer(Extension(self.payments.clone()))
            .layer(Extension(catalog))
    }

    pub(crate) fn access_token(&self, principal: &Principal) -> Result<String> {
        Ok(self
            .auth
            .codec()
            .issue(principal.id, TokenClass::Access, now_unix_seconds())?)
    }

    pub(crate) fn bearer(&self, principal: &Principal) -> Result<String> {
        Ok(format!("Bearer {}", self.access_token(principal)?))
    }
}
