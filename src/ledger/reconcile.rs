// src/ledger/reconcile.rs

use super::index::{KeyIndex, KeyStatus};
use super::record::{record_path, KeyRecord};
use super::store::LedgerStore;
use crate::error::OpklError;
use crate::model::{JsonWebKey, JsonWebKeySet};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

/// What to do when a key already archived in the ledger is published again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReappearancePolicy {
    /// Leave the entry archived.
    #[default]
    Ignore,
    /// Move the entry back to `active`. The recorded expiry is kept.
    Reactivate,
    /// Report the key as a reconciliation failure and leave it archived.
    Error,
}

impl FromStr for ReappearancePolicy {
    type Err = OpklError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "reactivate" => Ok(Self::Reactivate),
            "error" => Ok(Self::Error),
            other => Err(OpklError::InvalidConfiguration(format!(
                "unknown reappearance policy '{other}' (expected ignore|reactivate|error)"
            ))),
        }
    }
}

impl fmt::Display for ReappearancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ignore => "ignore",
            Self::Reactivate => "reactivate",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    pub reappearance: ReappearancePolicy,
}

/// What a reconciliation run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Newly ingested `kid`s.
    pub added: Vec<String>,
    /// `kid`s that rotated out during this run.
    pub archived: Vec<String>,
    /// Archived `kid`s moved back to active under [`ReappearancePolicy::Reactivate`].
    pub reactivated: Vec<String>,
    /// Live JWKs that could not be tracked (missing or duplicate `kid`).
    pub skipped: usize,
    /// Whether the key index was rewritten.
    pub index_written: bool,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        !self.index_written
    }
}

/// Brings an issuer's key index in line with the live key set observed at
/// `observed_at`.
///
/// New `kid`s get a record and an `active` entry. Active `kid`s missing from
/// `live` get their expiry stamped and move to `archived`. The index is
/// written once, and only if an entry changed.
///
/// A failure on one `kid` does not stop the others. Successful transitions are
/// still persisted, then every per-key failure is returned together in
/// [`OpklError::Reconciliation`]. Failing to read the index is fatal.
#[instrument(skip(store, live, options), fields(live_keys = live.keys.len()), err)]
pub fn reconcile<S: LedgerStore>(
    store: &S,
    key_index_path: &Path,
    live: &JsonWebKeySet,
    observed_at: i64,
    options: &ReconcileOptions,
) -> Result<ReconcileReport, OpklError> {
    let issuer_dir = key_index_path.parent().unwrap_or_else(|| Path::new(""));
    let mut index: KeyIndex = store.read_json(key_index_path)?.unwrap_or_default();
    let mut expected_active = index.active_kids();
    debug!(tracked = index.len(), active = expected_active.len(), "loaded key index");

    let mut report = ReconcileReport::default();
    let mut failures: Vec<(String, OpklError)> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for (position, jwk) in live.keys.iter().enumerate() {
        let Some(kid) = jwk.kid() else {
            warn!(position, kty = ?jwk.kty(), alg = ?jwk.alg(), "JWK has no kid; skipping");
            report.skipped += 1;
            continue;
        };
        if !seen.insert(kid) {
            warn!(kid, "duplicate kid in live JWKS; skipping repeat");
            report.skipped += 1;
            continue;
        }

        if let Some(entry) = index.get(kid) {
            expected_active.remove(kid);
            if entry.status != KeyStatus::Archived {
                continue;
            }
            match options.reappearance {
                ReappearancePolicy::Ignore => {
                    debug!(kid, "archived key is published again; leaving it archived");
                }
                ReappearancePolicy::Reactivate => match index.transition(kid, KeyStatus::Active) {
                    Ok(_) => {
                        info!(kid, "archived key is published again; reactivated");
                        report.reactivated.push(kid.to_string());
                    }
                    Err(e) => failures.push((kid.to_string(), e)),
                },
                ReappearancePolicy::Error => {
                    failures.push((kid.to_string(), OpklError::KeyReappeared(kid.to_string())));
                }
            }
            continue;
        }

        let path = record_path(issuer_dir, kid);
        match ingest(store, &path, jwk, observed_at) {
            Ok(nbf) => {
                index.track(kid, path);
                info!(kid, nbf, "new key added to ledger");
                report.added.push(kid.to_string());
            }
            Err(e) => {
                warn!(kid, error = %e, "failed to store key record");
                failures.push((kid.to_string(), e));
            }
        }
    }

    // Whatever is still expected has been rotated out by the provider.
    for kid in expected_active {
        match archive(store, &index, &kid, observed_at).and_then(|()| index.transition(&kid, KeyStatus::Archived)) {
            Ok(_) => {
                info!(kid = %kid, exp = observed_at, "key rotation detected; archived");
                report.archived.push(kid);
            }
            Err(e) => {
                warn!(kid = %kid, error = %e, "failed to archive key");
                failures.push((kid, e));
            }
        }
    }

    let changed = !(report.added.is_empty() && report.archived.is_empty() && report.reactivated.is_empty());
    if changed {
        store.write_json(key_index_path, &index)?;
        report.index_written = true;
    } else {
        debug!("ledger already up to date");
    }

    if failures.is_empty() {
        Ok(report)
    } else {
        Err(OpklError::Reconciliation { failures })
    }
}

/// Writes the record for a key the index does not know yet and returns its
/// `nbf`. A record already at `path` was left by a run whose index write
/// failed; it is kept as is so the first observation time survives.
fn ingest<S: LedgerStore>(store: &S, path: &Path, jwk: &JsonWebKey, observed_at: i64) -> Result<i64, OpklError> {
    if let Some(existing) = store.read_json::<KeyRecord>(path)? {
        debug!(path = %path.display(), nbf = existing.nbf, "key record already on disk; keeping it");
        return Ok(existing.nbf);
    }
    store.write_json(path, &KeyRecord::new(jwk.clone(), observed_at))?;
    Ok(observed_at)
}

/// Stamps the record's expiry and persists it.
fn archive<S: LedgerStore>(store: &S, index: &KeyIndex, kid: &str, at: i64) -> Result<(), OpklError> {
    let entry = index.get(kid).ok_or_else(|| OpklError::KeyNotFound(kid.to_string()))?;
    let mut record: KeyRecord = store
        .read_json(&entry.path)?
        .ok_or_else(|| OpklError::MissingRecord(entry.path.clone()))?;

    if record.expire(at) {
        store.write_json(&entry.path, &record)
    } else {
        // Only a reactivated key can be active with an expiry already recorded.
        warn!(kid, exp = ?record.exp, "record already has an expiry; keeping it");
        Ok(())
    }
}
