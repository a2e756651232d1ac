// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for the `opkl` library.
#[derive(Debug, Error)]
pub enum OpklError {
    /// The provider URI could not be parsed or is not an absolute `https` URL.
    #[error("Provider URI [{0}] is not valid")]
    InvalidIssuer(String),

    /// A provided URL (e.g. a discovered `jwks_uri`) could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The configuration file could not be parsed.
    #[error("Failed to parse config file {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A transport-level failure while talking to the provider.
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status code.
    #[error("Failed to retrieve {what}. Status code: {status}")]
    UnexpectedStatus { what: &'static str, status: u16 },

    /// The provider answered, but the payload could not be understood.
    #[error("Malformed {what}: {reason}")]
    MalformedResponse { what: &'static str, reason: String },

    /// Reading or writing a ledger file failed.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A ledger file exists but does not hold valid JSON for its type.
    #[error("Invalid JSON in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An index entry points at a key record that is not on disk.
    #[error("Key record missing: {0:?}")]
    MissingRecord(PathBuf),

    /// The issuer has no entry in the issuer index.
    #[error("Issuer not found in ledger: {0}")]
    IssuerNotFound(String),

    /// A key with the specified 'kid' is not tracked for this issuer.
    #[error("Key not found for kid: {0}")]
    KeyNotFound(String),

    /// An archived key was published again and the policy forbids it.
    #[error("Archived key reappeared in live JWKS: {0}")]
    KeyReappeared(String),

    /// One or more keys could not be reconciled. The rest of the batch was applied.
    #[error("Reconciliation failed for {} key(s): {}", .failures.len(), summarize(.failures))]
    Reconciliation { failures: Vec<(String, OpklError)> },
}

fn summarize(failures: &[(String, OpklError)]) -> String {
    failures
        .iter()
        .map(|(kid, e)| format!("[{kid}] {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl OpklError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OpklError::Io { path: path.into(), source }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        OpklError::Json { path: path.into(), source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconciliation_error_lists_every_failed_kid() {
        let err = OpklError::Reconciliation {
            failures: vec![
                ("k1".to_string(), OpklError::KeyNotFound("k1".to_string())),
                ("k2".to_string(), OpklError::KeyReappeared("k2".to_string())),
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Reconciliation failed for 2 key(s)"));
        assert!(msg.contains("[k1]"));
        assert!(msg.contains("[k2] Archived key reappeared"));
    }
}
