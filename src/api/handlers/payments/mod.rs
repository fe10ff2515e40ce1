//! Donations and their payment lifecycle.
//!
//! A donation request is validated, stored together with a `created`
//! transaction, and opened with the payment gateway. The gateway outcome comes
//! back through the signed webhook or an operator reconcile call.

pub(crate) mod donations;
pub mod error;
pub mod flow;
pub mod gateway;
mod state;
pub mod storage;
pub mod types;
pub mod validation;
pub(crate) mod webhook;

pub use error::PaymentError;
pub use flow::PaymentFlow;
pub use gateway::{GatewayConfig, PaymentGateway, PaystackGateway};
pub use state::PaymentState;
pub use storage::{PgTransactionStore, TransactionStore};
