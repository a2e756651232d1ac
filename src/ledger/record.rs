// src/ledger/record.rs

use crate::model::JsonWebKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Directory, below an issuer's directory, holding one file per key.
pub const KEYS_DIR: &str = "keys";

/// One ledger entry: the key as published plus its validity window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// The JWK exactly as the provider published it.
    pub jwk: JsonWebKey,
    /// Unix time at which the key was first observed. Never changes.
    pub nbf: i64,
    /// Unix time at which the key was seen to be rotated out. Set at most once.
    pub exp: Option<i64>,
}

impl KeyRecord {
    pub fn new(jwk: JsonWebKey, observed_at: i64) -> Self {
        Self { jwk, nbf: observed_at, exp: None }
    }

    /// Stamps the expiry if none is recorded yet. Returns `false` if the
    /// record already carried one, in which case it is left untouched.
    pub fn expire(&mut self, at: i64) -> bool {
        if self.exp.is_some() {
            return false;
        }
        self.exp = Some(at);
        true
    }
}

/// Derives where the record for `kid` lives inside `issuer_dir`.
///
/// The `kid` is provider controlled, so it is hashed rather than used as a
/// path component. Same `kid`, same path.
pub fn record_path(issuer_dir: &Path, kid: &str) -> PathBuf {
    let digest = Sha256::digest(kid.as_bytes());
    issuer_dir.join(KEYS_DIR).join(format!("{}.json", hex::encode(digest)))
}
