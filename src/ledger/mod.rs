// src/ledger/mod.rs

pub mod index;
pub mod issuer;
pub mod reconcile;
pub mod record;
pub mod store;

pub use index::{KeyIndex, KeyIndexEntry, KeyStatus};
pub use issuer::{IssuerId, IssuerIndex, IssuerIndexEntry, IssuerLocation};
pub use reconcile::{ReappearancePolicy, ReconcileOptions, ReconcileReport};
pub use record::KeyRecord;
pub use store::{FsStore, LedgerStore};

use crate::error::OpklError;
use crate::model::JsonWebKeySet;
use std::path::PathBuf;
use tracing::{info, instrument};

/// One row of an issuer's key history.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyHistory {
    pub kid: String,
    pub status: KeyStatus,
    pub nbf: i64,
    pub exp: Option<i64>,
    pub path: PathBuf,
}

/// The OIDC Public Key Ledger rooted at a store.
///
/// Single writer: callers must not run two operations against the same issuer
/// concurrently.
#[derive(Debug, Clone)]
pub struct Ledger<S = FsStore> {
    store: S,
}

impl Ledger<FsStore> {
    /// Opens (lazily) the file-based ledger under `root`.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::with_store(FsStore::new(root))
    }
}

impl<S: LedgerStore> Ledger<S> {
    pub fn with_store(store: S) -> Self {
        Self { store }
    }

    /// Finds or provisions the issuer's key index. See [`issuer::resolve_issuer`].
    pub fn resolve_issuer(&self, issuer: &IssuerId) -> Result<IssuerLocation, OpklError> {
        issuer::resolve_issuer(&self.store, issuer)
    }

    /// Reconciles a resolved issuer against a live key set fetched at `observed_at`.
    pub fn reconcile(
        &self,
        location: &IssuerLocation,
        live: &JsonWebKeySet,
        observed_at: i64,
        options: &ReconcileOptions,
    ) -> Result<ReconcileReport, OpklError> {
        reconcile::reconcile(&self.store, &location.entry.path, live, observed_at, options)
    }

    /// Looks an issuer up without provisioning it.
    fn existing(&self, issuer: &IssuerId) -> Result<IssuerIndexEntry, OpklError> {
        issuer::load_issuer_index(&self.store)?
            .lookup(issuer)
            .cloned()
            .ok_or_else(|| OpklError::IssuerNotFound(issuer.to_string()))
    }

    fn key_index(&self, entry: &IssuerIndexEntry) -> Result<KeyIndex, OpklError> {
        Ok(self.store.read_json(&entry.path)?.unwrap_or_default())
    }

    /// Every key ever tracked for `issuer`, ordered by `kid`.
    pub fn history(&self, issuer: &IssuerId) -> Result<Vec<KeyHistory>, OpklError> {
        let entry = self.existing(issuer)?;
        self.key_index(&entry)?
            .keys
            .into_iter()
            .map(|(kid, e)| -> Result<KeyHistory, OpklError> {
                let record: KeyRecord = self
                    .store
                    .read_json(&e.path)?
                    .ok_or_else(|| OpklError::MissingRecord(e.path.clone()))?;
                Ok(KeyHistory { kid, status: e.status, nbf: record.nbf, exp: record.exp, path: e.path })
            })
            .collect()
    }

    /// Operator action: marks a tracked key `revoked`.
    ///
    /// If the key was still active its expiry is stamped with `at`, so the
    /// record never claims validity past the revocation. Returns `false` if the
    /// key was already revoked.
    #[instrument(skip(self), fields(issuer = %issuer))]
    pub fn revoke(&self, issuer: &IssuerId, kid: &str, at: i64) -> Result<bool, OpklError> {
        let entry = self.existing(issuer)?;
        let mut index = self.key_index(&entry)?;
        let key = index.get(kid).ok_or_else(|| OpklError::KeyNotFound(kid.to_string()))?;
        if key.status == KeyStatus::Revoked {
            return Ok(false);
        }

        let mut record: KeyRecord = self
            .store
            .read_json(&key.path)?
            .ok_or_else(|| OpklError::MissingRecord(key.path.clone()))?;
        if record.expire(at) {
            self.store.write_json(&key.path, &record)?;
        }

        let previous = index.transition(kid, KeyStatus::Revoked)?;
        self.store.write_json(&entry.path, &index)?;
        info!(kid, %previous, exp = ?record.exp, "key revoked");
        Ok(true)
    }
}
