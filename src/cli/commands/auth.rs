use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";

/// Smallest accepted signing secret, in bytes (HS256 key length).
pub const MIN_JWT_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub cookie_secure: bool,
}

impl Options {
    /// Parse token signing arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the secret is missing or shorter than 32 bytes.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .map(|value| value.trim().to_string())
            .unwrap_or_default();

        if secret.is_empty() {
            anyhow::bail!("missing required argument: --{ARG_JWT_SECRET}");
        }
        if secret.len() < MIN_JWT_SECRET_BYTES {
            anyhow::bail!("--{ARG_JWT_SECRET} must be at least {MIN_JWT_SECRET_BYTES} bytes");
        }

        Ok(Self {
            jwt_secret: SecretString::from(secret),
            cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("Secret used to sign and verify access and refresh tokens")
                .long_help(
                    "Secret used to sign and verify access and refresh tokens (HS256, at least 32 bytes).\n\nRotating it invalidates every token issued so far.",
                )
                .env("GIVEAID_JWT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the access_token cookie as Secure (HTTPS only)")
                .env("GIVEAID_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
}
