use secrecy::SecretString;

use super::flow::PaymentFlow;

/// Immutable payment state shared by every request.
pub struct PaymentState {
    flow: PaymentFlow,
    webhook_secret: SecretString,
}

impl PaymentState {
    /// `webhook_secret` is the gateway secret key; the gateway signs webhook bodies with it.
    #[must_use]
    pub fn new(flow: PaymentFlow, webhook_secret: SecretString) -> Self {
        Self {
            flow,
            webhook_secret,
        }
    }

    #[must_use]
    pub fn flow(&self) -> &PaymentFlow {
        &self.flow
    }

    #[must_use]
    pub fn webhook_secret(&self) -> &SecretString {
        &self.webhook_secret
    }
}
