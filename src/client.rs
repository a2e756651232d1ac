// src/client.rs

use crate::config::Config;
use crate::error::OpklError;
use crate::ledger::IssuerId;
use crate::model::{FetchedKeySet, JsonWebKeySet, OidcDiscoveryDocument};
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, enabled, info, instrument, Level};
use url::Url;

/// A client for discovering and fetching an OIDC provider's JWKS.
///
/// It never retries; a failed fetch is surfaced to the caller as is.
#[derive(Clone, Debug)]
pub struct JwksClient {
    // The client is internally ref-counted to allow for cheap cloning.
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http_client: reqwest::Client,
    jwks_uri_override: Option<Url>,
}

impl JwksClient {
    /// Creates a new `JwksClient` using the timeout and JWKS override from `config`.
    pub fn new(config: &Config) -> Result<Self, OpklError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                http_client,
                jwks_uri_override: config.jwks_uri.clone(),
            }),
        })
    }

    /// Resolves the JWKS endpoint and fetches the live key set.
    #[instrument(skip(self), fields(issuer = %issuer), err)]
    pub async fn fetch(&self, issuer: &IssuerId) -> Result<FetchedKeySet, OpklError> {
        let jwks_uri = self.get_jwks_uri(issuer).await?;
        self.fetch_key_set(&jwks_uri).await
    }

    /// Fetches the OIDC discovery document for `issuer`.
    pub async fn discover(&self, issuer: &IssuerId) -> Result<OidcDiscoveryDocument, OpklError> {
        let doc = self.discover_at(issuer.discovery_url()?).await?;
        if let Some(advertised) = doc.issuer.as_deref() {
            if advertised.trim_end_matches('/') != issuer.as_str() {
                debug!(advertised, "discovery document advertises a different issuer");
            }
        }
        Ok(doc)
    }

    /// Fetches a discovery document from an explicit URL.
    pub async fn discover_at(&self, discovery_url: Url) -> Result<OidcDiscoveryDocument, OpklError> {
        debug!("Performing OIDC discovery at: {}", discovery_url);
        let (doc, _) = self
            .get_json::<OidcDiscoveryDocument>(discovery_url, "OpenID configuration")
            .await?;
        Ok(doc)
    }

    /// Fetches a JWKS document. The timestamp is taken when the response
    /// arrives, before the body is decoded.
    #[instrument(skip(self), err)]
    pub async fn fetch_key_set(&self, jwks_uri: &Url) -> Result<FetchedKeySet, OpklError> {
        let (keys, fetched_at) = self.get_json::<JsonWebKeySet>(jwks_uri.clone(), "JWKS").await?;

        info!("Successfully fetched {} keys from {}", keys.keys.len(), jwks_uri);
        if enabled!(Level::DEBUG) {
            if let Ok(pretty) = serde_json::to_string_pretty(&keys) {
                debug!(fetched_at, "{}", pretty);
            }
        }

        Ok(FetchedKeySet { jwks_uri: jwks_uri.clone(), keys, fetched_at })
    }

    /// Determines the JWKS URI, either from config override or OIDC discovery.
    async fn get_jwks_uri(&self, issuer: &IssuerId) -> Result<Url, OpklError> {
        if let Some(uri) = self.inner.jwks_uri_override.clone() {
            debug!("Using JWKS URI from config override: {}", uri);
            return Ok(uri);
        }

        let jwks_uri = self.discover(issuer).await?.jwks_url()?;
        debug!("Discovered JWKS URI: {}", jwks_uri);
        Ok(jwks_uri)
    }

    /// GETs `url` and decodes a JSON body, keeping transport, status and
    /// payload failures apart. Also returns the arrival time of the response.
    async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &'static str) -> Result<(T, i64), OpklError> {
        let response = self
            .inner
            .http_client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let received_at = unix_now();

        let status = response.status();
        if !status.is_success() {
            return Err(OpklError::UnexpectedStatus { what, status: status.as_u16() });
        }

        let body = response.bytes().await?;
        let value = serde_json::from_slice(&body)
            .map_err(|e| OpklError::MalformedResponse { what, reason: e.to_string() })?;
        Ok((value, received_at))
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
