use crate::api::{
    self,
    handlers::{auth::AuthConfig, payments::GatewayConfig},
};
use anyhow::Result;
use secrecy::SecretString;
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
    pub cookie_secure: bool,
    pub gateway_url: String,
    pub gateway_secret_key: SecretString,
    pub gateway_callback_url: Option<String>,
    pub gateway_timeout_seconds: u64,
}

impl Args {
    fn auth_config(&self) -> AuthConfig {
        AuthConfig::new().with_cookie_secure(self.cookie_secure)
    }

    fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::new(self.gateway_secret_key.clone())
            .with_base_url(self.gateway_url.clone())
            .with_callback_url(self.gateway_callback_url.clone())
            .with_timeout(Duration::from_secs(self.gateway_timeout_seconds))
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = args.auth_config();
    let gateway_config = args.gateway_config();

    debug!(
        port = args.port,
        gateway_url = gateway_config.base_url(),
        "Starting server"
    );

    api::new(
        args.port,
        args.dsn,
        auth_config,
        args.jwt_secret,
        gateway_config,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn args() -> Args {
        Args {
            port: 8080,
            dsn: "postgres://giveaid@localhost:5432/giveaid".to_string(),
            jwt_secret: SecretString::from("a".repeat(32)),
            cookie_secure: true,
            gateway_url: "https://api.paystack.co/".to_string(),
            gateway_secret_key: SecretString::from("sk_test_123"),
            gateway_callback_url: Some("https://giveaid.com/thanks".to_string()),
            gateway_timeout_seconds: 3,
        }
    }

    #[test]
    fn gateway_config_from_args() {
        let config = args().gateway_config();
        assert_eq!(config.base_url(), "https://api.paystack.co");
        assert_eq!(config.secret_key().expose_secret(), "sk_test_123");
        assert_eq!(config.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn auth_config_from_args() {
        assert!(args().auth_config().cookie_secure());
    }
}
