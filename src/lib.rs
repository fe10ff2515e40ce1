//! # GiveAid (donation management API)
//!
//! `giveaid` serves the donation backend: users register and sign in, browse
//! causes, donate (signed in or anonymously), and payments are opened against
//! an external gateway and reconciled from the outcome it reports.
//!
//! ## Authentication
//!
//! Sign-in issues a pair of stateless HS256 tokens: an `access` token valid for
//! two hours and a `refresh` token valid for seven days. Both are signed with a
//! single process-wide secret supplied at startup. Tokens are never stored, so
//! logging out only clears the client-side cookie; an issued token stays valid
//! until it expires, including a refresh token that has already been exchanged.
//!
//! ## Payments
//!
//! Every donation attempt opens exactly one transaction with a freshly
//! generated id. Transactions move one way only:
//! `created → pending_gateway → completed | failed`, or `created → failed` when
//! the gateway refuses or times out. Reconciling a settled transaction with the
//! same outcome is a no-op; a different outcome is reported as a conflict and
//! never overwrites the stored state.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
