// src/ledger/index.rs

use crate::error::OpklError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// File name of an issuer's key index inside its directory.
pub const KEY_INDEX_FILENAME: &str = "pkl.json";

/// Lifecycle state of a tracked key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Archived,
    /// Only ever set by an operator; reconciliation never produces it.
    Revoked,
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyStatus::Active => "active",
            KeyStatus::Archived => "archived",
            KeyStatus::Revoked => "revoked",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyIndexEntry {
    pub status: KeyStatus,
    /// Record location, relative to the ledger root.
    pub path: PathBuf,
}

/// Per-issuer map of every `kid` ever observed. Entries are never removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyIndex {
    #[serde(rename = "pkl", default)]
    pub keys: BTreeMap<String, KeyIndexEntry>,
}

impl KeyIndex {
    pub fn get(&self, kid: &str) -> Option<&KeyIndexEntry> {
        self.keys.get(kid)
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    /// The `kid`s the provider is expected to still publish.
    pub fn active_kids(&self) -> BTreeSet<String> {
        self.keys
            .iter()
            .filter(|(_, entry)| entry.status == KeyStatus::Active)
            .map(|(kid, _)| kid.clone())
            .collect()
    }

    /// Starts tracking a newly observed key as `active`.
    pub(crate) fn track(&mut self, kid: &str, path: PathBuf) {
        self.keys
            .entry(kid.to_string())
            .or_insert(KeyIndexEntry { status: KeyStatus::Active, path });
    }

    /// Moves an entry to `to`, returning its previous status.
    pub(crate) fn transition(&mut self, kid: &str, to: KeyStatus) -> Result<KeyStatus, OpklError> {
        let entry = self
            .keys
            .get_mut(kid)
            .ok_or_else(|| OpklError::KeyNotFound(kid.to_string()))?;
        Ok(std::mem::replace(&mut entry.status, to))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_original_on_disk_format() {
        let index: KeyIndex = serde_json::from_value(json!({
            "pkl": {
                "k1": {"status": "active", "path": "issuer.example/keys/a.json"},
                "k2": {"status": "archived", "path": "issuer.example/keys/b.json"},
                "k3": {"status": "revoked", "path": "issuer.example/keys/c.json"}
            }
        }))
        .unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.active_kids(), BTreeSet::from(["k1".to_string()]));
        assert_eq!(index.get("k3").unwrap().status, KeyStatus::Revoked);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let result: Result<KeyIndex, _> = serde_json::from_value(json!({
            "pkl": {"k1": {"status": "deleted", "path": "x"}}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn track_never_overwrites_an_entry() {
        let mut index = KeyIndex::default();
        index.track("k1", PathBuf::from("a.json"));
        index.transition("k1", KeyStatus::Archived).unwrap();
        index.track("k1", PathBuf::from("b.json"));

        let entry = index.get("k1").unwrap();
        assert_eq!(entry.status, KeyStatus::Archived);
        assert_eq!(entry.path, PathBuf::from("a.json"));
    }

    #[test]
    fn transition_of_unknown_kid_fails() {
        let mut index = KeyIndex::default();
        assert!(matches!(
            index.transition("ghost", KeyStatus::Archived),
            Err(OpklError::KeyNotFound(_))
        ));
    }
}
