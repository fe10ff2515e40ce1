//! API handlers for GiveAid.
//!
//! `auth` owns credentials and access policy, `payments` owns donations and
//! the transaction lifecycle, `catalog` and `users` are thin CRUD surfaces over
//! their stores.

pub mod auth;
pub mod catalog;
pub mod error;
pub mod health;
pub mod payments;
pub mod users;

#[cfg(test)]
pub(crate) mod test_support;
