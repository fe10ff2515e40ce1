use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

use crate::api::handlers::payments::gateway::{DEFAULT_GATEWAY_URL, DEFAULT_TIMEOUT_SECONDS};

pub const ARG_GATEWAY_URL: &str = "gateway-url";
pub const ARG_GATEWAY_SECRET_KEY: &str = "gateway-secret-key";
pub const ARG_GATEWAY_CALLBACK_URL: &str = "gateway-callback-url";
pub const ARG_GATEWAY_TIMEOUT_SECONDS: &str = "gateway-timeout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub url: String,
    pub secret_key: SecretString,
    pub callback_url: Option<String>,
    pub timeout_seconds: u64,
}

impl Options {
    /// Parse payment gateway arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the secret key is missing, a URL does not parse or the timeout is zero.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let Some(secret_key) = get_non_empty(ARG_GATEWAY_SECRET_KEY) else {
            anyhow::bail!("missing required argument: --{ARG_GATEWAY_SECRET_KEY}");
        };

        let timeout_seconds = matches
            .get_one::<u64>(ARG_GATEWAY_TIMEOUT_SECONDS)
            .copied()
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        if timeout_seconds == 0 {
            anyhow::bail!("--{ARG_GATEWAY_TIMEOUT_SECONDS} must be greater than zero");
        }

        let url = get_non_empty(ARG_GATEWAY_URL)
            .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());
        Url::parse(&url).map_err(|err| anyhow::anyhow!("invalid --{ARG_GATEWAY_URL}: {err}"))?;

        let callback_url = get_non_empty(ARG_GATEWAY_CALLBACK_URL);
        if let Some(callback_url) = &callback_url {
            Url::parse(callback_url)
                .map_err(|err| anyhow::anyhow!("invalid --{ARG_GATEWAY_CALLBACK_URL}: {err}"))?;
        }

        Ok(Self {
            url,
            secret_key: SecretString::from(secret_key),
            callback_url,
            timeout_seconds,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GATEWAY_URL)
                .long(ARG_GATEWAY_URL)
                .help("Payment gateway base URL")
                .env("GIVEAID_GATEWAY_URL")
                .default_value(DEFAULT_GATEWAY_URL),
        )
        .arg(
            Arg::new(ARG_GATEWAY_SECRET_KEY)
                .long(ARG_GATEWAY_SECRET_KEY)
                .help("Payment gateway secret key (also verifies webhook signatures)")
                .env("GIVEAID_GATEWAY_SECRET_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_GATEWAY_CALLBACK_URL)
                .long(ARG_GATEWAY_CALLBACK_URL)
                .help("URL the gateway redirects donors to after checkout")
                .env("GIVEAID_GATEWAY_CALLBACK_URL"),
        )
        .arg(
            Arg::new(ARG_GATEWAY_TIMEOUT_SECONDS)
                .long(ARG_GATEWAY_TIMEOUT_SECONDS)
                .help(format!(
                    "Timeout for opening a transaction with the gateway [default: {DEFAULT_TIMEOUT_SECONDS}]"
                ))
                .env("GIVEAID_GATEWAY_TIMEOUT_SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
}
