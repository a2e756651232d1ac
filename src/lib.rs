// src/lib.rs

//! OIDC Public Key Ledger (OPKL).
//!
//! Keeps a durable history of an OpenID Provider's signing keys: when each
//! JWK first appeared in the provider's JWKS and when it was rotated out, so
//! tokens signed by retired keys can still be checked against the window in
//! which the key was published.

pub mod client;
pub mod config;
pub mod error;
pub mod ledger;
pub mod model;

/// The public prelude for the `opkl` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::client::JwksClient;
    pub use crate::config::{Config, ConfigBuilder};
    pub use crate::error::OpklError;
    pub use crate::ledger::{
        IssuerId, KeyHistory, KeyStatus, Ledger, ReappearancePolicy, ReconcileOptions, ReconcileReport,
    };
    pub use crate::model::{FetchedKeySet, JsonWebKey, JsonWebKeySet};
}
