// src/model.rs

use crate::error::OpklError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// Represents the data structure of an OIDC provider's discovery document.
/// Found at the `.well-known/openid-configuration` endpoint.
#[derive(Debug, Deserialize)]
pub struct OidcDiscoveryDocument {
    #[serde(default)]
    pub issuer: Option<String>,
    pub jwks_uri: String,
}

impl OidcDiscoveryDocument {
    /// The advertised `jwks_uri` as an absolute URL.
    pub fn jwks_url(&self) -> Result<Url, OpklError> {
        Url::parse(&self.jwks_uri).map_err(|e| OpklError::MalformedResponse {
            what: "OpenID configuration",
            reason: format!("jwks_uri '{}' is not a valid URL: {}", self.jwks_uri, e),
        })
    }
}

/// Represents a single JSON Web Key (JWK) as defined in RFC 7517.
///
/// The ledger must store exactly what the provider published, so the key is
/// kept as its raw JSON object. Typed accessors cover the few members the
/// ledger inspects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonWebKey(pub Map<String, Value>);

impl JsonWebKey {
    /// The key ID. `kid` is OPTIONAL in RFC 7517 but required to track a key.
    /// Empty or non-string values count as missing.
    pub fn kid(&self) -> Option<&str> {
        self.str_member("kid").filter(|kid| !kid.is_empty())
    }

    pub fn kty(&self) -> Option<&str> {
        self.str_member("kty")
    }

    pub fn alg(&self) -> Option<&str> {
        self.str_member("alg")
    }

    fn str_member(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for JsonWebKey {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Represents a JSON Web Key Set (JWKS), which is a collection of JWKs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

/// A live key set together with the moment the fetch completed.
#[derive(Debug, Clone)]
pub struct FetchedKeySet {
    pub jwks_uri: Url,
    pub keys: JsonWebKeySet,
    /// Unix seconds at which the JWKS response arrived.
    pub fetched_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn jwk_preserves_unknown_members() {
        let raw = json!({
            "kty": "RSA",
            "kid": "abc",
            "n": "modulus",
            "e": "AQAB",
            "x5t#S256": "thumb",
            "custom": {"nested": true}
        });
        let jwk: JsonWebKey = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(jwk.kid(), Some("abc"));
        assert_eq!(jwk.kty(), Some("RSA"));
        assert_eq!(jwk.alg(), None);
        assert_eq!(serde_json::to_value(&jwk).unwrap(), raw);
    }

    #[test]
    fn jwk_without_usable_kid() {
        let missing: JsonWebKey = serde_json::from_value(json!({"kty": "EC"})).unwrap();
        let empty: JsonWebKey = serde_json::from_value(json!({"kty": "EC", "kid": ""})).unwrap();
        let numeric: JsonWebKey = serde_json::from_value(json!({"kty": "EC", "kid": 7})).unwrap();
        assert!(missing.kid().is_none());
        assert!(empty.kid().is_none());
        assert!(numeric.kid().is_none());
    }

    #[test]
    fn discovery_document_requires_jwks_uri() {
        let missing: Result<OidcDiscoveryDocument, _> = serde_json::from_value(json!({"issuer": "https://x"}));
        assert!(missing.is_err());

        let relative: OidcDiscoveryDocument = serde_json::from_value(json!({"jwks_uri": "/keys"})).unwrap();
        assert!(matches!(relative.jwks_url(), Err(OpklError::MalformedResponse { .. })));

        let ok: OidcDiscoveryDocument =
            serde_json::from_value(json!({"issuer": "https://x", "jwks_uri": "https://x/keys", "extra": 1})).unwrap();
        assert_eq!(ok.jwks_url().unwrap().as_str(), "https://x/keys");
    }

    #[test]
    fn jwks_rejects_non_object_keys() {
        let result: Result<JsonWebKeySet, _> = serde_json::from_value(json!({"keys": ["nope"]}));
        assert!(result.is_err());
    }
}
