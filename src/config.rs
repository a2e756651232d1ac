// src/config.rs

use crate::error::OpklError;
use crate::ledger::{ReappearancePolicy, ReconcileOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default location of the ledger tree, relative to the working directory.
pub const DEFAULT_LEDGER_ROOT: &str = "targets/opkl";
/// Config file read when present and no explicit `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "./config.opkl-updater.yaml";
/// Prefix for environment overrides, e.g. `OPKL_UPDATER_LEDGER_ROOT`.
pub const ENV_PREFIX: &str = "OPKL_UPDATER_";

/// The main configuration for the ledger updater.
///
/// It should be constructed using the `ConfigBuilder`, or loaded with
/// [`Config::load`] which layers a YAML file and the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory of the ledger tree. Every path stored in an index is relative to it.
    pub ledger_root: PathBuf,
    /// Log filter directive handed to the subscriber (e.g. `info`, `opkl=debug`).
    pub log_level: String,
    /// Emit logs as JSON lines instead of human readable text.
    pub json_logs: bool,
    /// What to do when an archived key shows up in the live JWKS again.
    pub reappearance: ReappearancePolicy,
    /// Timeout applied to each discovery/JWKS request.
    pub http_timeout: Duration,
    /// Optional override for the JWKS endpoint. If `None`, the URL is
    /// discovered from the issuer's `.well-known/openid-configuration`.
    pub jwks_uri: Option<Url>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger_root: PathBuf::from(DEFAULT_LEDGER_ROOT),
            log_level: "info".to_string(),
            json_logs: false,
            reappearance: ReappearancePolicy::default(),
            http_timeout: Duration::from_secs(30),
            jwks_uri: None,
        }
    }
}

impl From<&Config> for ReconcileOptions {
    fn from(config: &Config) -> Self {
        Self { reappearance: config.reappearance }
    }
}

/// On-disk shape of the YAML config file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    ledger_root: Option<PathBuf>,
    #[serde(alias = "loglevel")]
    log_level: Option<String>,
    json_logs: Option<bool>,
    reappearance: Option<ReappearancePolicy>,
    http_timeout_secs: Option<u64>,
    jwks_uri: Option<Url>,
}

impl Config {
    /// Loads configuration from defaults, then `path` (or the default config
    /// file if it exists), then `OPKL_UPDATER_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, OpklError> {
        let mut builder = ConfigBuilder::new();

        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
        };
        if let Some(file) = file {
            builder = builder.merge_file(&file)?;
        }

        builder.merge_env(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())?.build()
    }
}

/// A builder for creating a `Config` instance.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new `ConfigBuilder` seeded with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.ledger_root = root.into();
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    pub fn json_logs(mut self, enabled: bool) -> Self {
        self.config.json_logs = enabled;
        self
    }

    pub fn reappearance(mut self, policy: ReappearancePolicy) -> Self {
        self.config.reappearance = policy;
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.config.http_timeout = timeout;
        self
    }

    /// Sets an explicit JWKS URI, bypassing OIDC discovery.
    pub fn jwks_uri(mut self, url: &str) -> Result<Self, OpklError> {
        let parsed = Url::parse(url).map_err(|e| OpklError::InvalidUrl(e.to_string()))?;
        self.config.jwks_uri = Some(parsed);
        Ok(self)
    }

    /// Overlays the values present in a YAML config file.
    pub fn merge_file(self, path: &Path) -> Result<Self, OpklError> {
        let content = std::fs::read_to_string(path).map_err(|e| OpklError::io(path, e))?;
        // An empty YAML document deserializes as unit, not as an empty map.
        if content.trim().is_empty() {
            return Ok(self);
        }
        let file: FileConfig = serde_yaml::from_str(&content).map_err(|source| OpklError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.merge(file))
    }

    /// Overlays values from an environment lookup. `lookup` receives the key
    /// without the `OPKL_UPDATER_` prefix.
    pub fn merge_env<F>(self, lookup: F) -> Result<Self, OpklError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let json_logs = lookup("JSON_LOGS")
            .map(|v| parse_bool(&v).ok_or_else(|| invalid("JSON_LOGS", &v)))
            .transpose()?;
        let reappearance = lookup("REAPPEARANCE")
            .map(|v| v.parse::<ReappearancePolicy>())
            .transpose()?;
        let http_timeout_secs = lookup("HTTP_TIMEOUT_SECS")
            .map(|v| v.parse::<u64>().map_err(|_| invalid("HTTP_TIMEOUT_SECS", &v)))
            .transpose()?;
        let jwks_uri = lookup("JWKS_URI")
            .map(|v| Url::parse(&v).map_err(|e| OpklError::InvalidUrl(e.to_string())))
            .transpose()?;

        Ok(self.merge(FileConfig {
            ledger_root: lookup("LEDGER_ROOT").map(PathBuf::from),
            log_level: lookup("LOG_LEVEL"),
            json_logs,
            reappearance,
            http_timeout_secs,
            jwks_uri,
        }))
    }

    fn merge(mut self, layer: FileConfig) -> Self {
        if let Some(root) = layer.ledger_root {
            self.config.ledger_root = root;
        }
        if let Some(level) = layer.log_level {
            self.config.log_level = level;
        }
        if let Some(json_logs) = layer.json_logs {
            self.config.json_logs = json_logs;
        }
        if let Some(policy) = layer.reappearance {
            self.config.reappearance = policy;
        }
        if let Some(secs) = layer.http_timeout_secs {
            self.config.http_timeout = Duration::from_secs(secs);
        }
        if layer.jwks_uri.is_some() {
            self.config.jwks_uri = layer.jwks_uri;
        }
        self
    }

    /// Consumes the builder and returns a `Config` object.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger root is empty or the timeout is zero.
    pub fn build(self) -> Result<Config, OpklError> {
        if self.config.ledger_root.as_os_str().is_empty() {
            return Err(OpklError::InvalidConfiguration("ledger_root must not be empty".to_string()));
        }
        if self.config.http_timeout.is_zero() {
            return Err(OpklError::InvalidConfiguration("http_timeout must be greater than zero".to_string()));
        }
        Ok(self.config)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn invalid(key: &str, value: &str) -> OpklError {
    OpklError::InvalidConfiguration(format!("{ENV_PREFIX}{key} has invalid value '{value}'"))
}
