//! JWK (JSON Web Key) and JWK set model.
//!
//! Entity statements carry their federation keys as a `jwks` claim; relying
//! parties may additionally host a signed key set with encryption keys and
//! TLS client certificates.

use crate::error::AuthError;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};

/// A JSON Web Key as defined in RFC 7517.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    /// Key ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Public key use ("sig" or "enc").
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// Algorithm (e.g., "RS256", "ES256").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// RSA modulus (`Base64URL` encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (`Base64URL` encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (`Base64URL` encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (`Base64URL` encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    /// X.509 certificate chain (standard base64 DER, leaf first).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,
}

impl Jwk {
    /// Build an RSA signing key from its public components.
    #[must_use]
    pub fn rsa(kid: impl Into<String>, n: impl Into<String>, e: impl Into<String>) -> Self {
        Self {
            kty: "RSA".to_string(),
            kid: Some(kid.into()),
            key_use: Some("sig".to_string()),
            alg: Some("RS256".to_string()),
            n: Some(n.into()),
            e: Some(e.into()),
            crv: None,
            x: None,
            y: None,
            x5c: None,
        }
    }

    /// Set the key use.
    #[must_use]
    pub fn with_use(mut self, key_use: impl Into<String>) -> Self {
        self.key_use = Some(key_use.into());
        self
    }

    /// Attach an X.509 certificate chain.
    #[must_use]
    pub fn with_x5c(mut self, chain: Vec<String>) -> Self {
        self.x5c = Some(chain);
        self
    }

    /// Keys without an explicit use are accepted for signatures.
    #[must_use]
    pub fn is_signing_key(&self) -> bool {
        self.key_use.is_none() || self.key_use.as_deref() == Some("sig")
    }

    #[must_use]
    pub fn is_encryption_key(&self) -> bool {
        self.key_use.as_deref() == Some("enc")
    }

    /// A TLS client certificate is published as a signing key with a
    /// non-empty `x5c` chain.
    #[must_use]
    pub fn is_tls_client_cert(&self) -> bool {
        self.key_use.as_deref() == Some("sig")
            && self.x5c.as_ref().is_some_and(|chain| !chain.is_empty())
    }

    /// The leaf certificate of the `x5c` chain, if any.
    #[must_use]
    pub fn leaf_certificate(&self) -> Option<&str> {
        self.x5c.as_ref().and_then(|c| c.first()).map(String::as_str)
    }

    /// The JWS algorithm this key verifies.
    ///
    /// Falls back to the key type when `alg` is absent.
    pub fn algorithm(&self) -> Result<Algorithm, AuthError> {
        match (self.alg.as_deref(), self.kty.as_str()) {
            (Some("RS256"), "RSA") | (None, "RSA") => Ok(Algorithm::RS256),
            (Some("ES256"), "EC") | (None, "EC") => Ok(Algorithm::ES256),
            (Some(alg), kty) => Err(AuthError::InvalidAlgorithm(format!(
                "{alg} with key type {kty}"
            ))),
            (None, kty) => Err(AuthError::InvalidKey(format!(
                "Unsupported key type: {kty}"
            ))),
        }
    }

    /// Convert the public components into a verification key.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidKey` if required components are missing or
    /// cannot be decoded.
    pub fn to_decoding_key(&self) -> Result<DecodingKey, AuthError> {
        match self.kty.as_str() {
            "RSA" => {
                let n = self
                    .n
                    .as_deref()
                    .ok_or_else(|| AuthError::InvalidKey("Missing modulus (n)".to_string()))?;
                let e = self
                    .e
                    .as_deref()
                    .ok_or_else(|| AuthError::InvalidKey("Missing exponent (e)".to_string()))?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| AuthError::InvalidKey(format!("Invalid RSA components: {e}")))
            }
            "EC" => {
                if self.crv.as_deref() != Some("P-256") {
                    return Err(AuthError::InvalidKey(format!(
                        "Unsupported curve: {}",
                        self.crv.as_deref().unwrap_or("none")
                    )));
                }
                let x = self
                    .x
                    .as_deref()
                    .ok_or_else(|| AuthError::InvalidKey("Missing x coordinate".to_string()))?;
                let y = self
                    .y
                    .as_deref()
                    .ok_or_else(|| AuthError::InvalidKey("Missing y coordinate".to_string()))?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| AuthError::InvalidKey(format!("Invalid EC components: {e}")))
            }
            other => Err(AuthError::InvalidKey(format!(
                "Unsupported key type: {other}"
            ))),
        }
    }
}

/// A JSON Web Key Set as defined in RFC 7517.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    /// Array of JWK values.
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    #[must_use]
    pub fn new(keys: Vec<Jwk>) -> Self {
        Self { keys }
    }

    /// Find a key by its kid.
    #[must_use]
    pub fn find_key(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    /// The first key usable for signature verification.
    #[must_use]
    pub fn first_signing_key(&self) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.is_signing_key())
    }

    /// The first key published for encryption.
    #[must_use]
    pub fn encryption_key(&self) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.is_encryption_key())
    }

    /// All keys carrying a TLS client certificate.
    #[must_use]
    pub fn tls_client_certs(&self) -> Vec<&Jwk> {
        self.keys.iter().filter(|k| k.is_tls_client_cert()).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc_key() -> Jwk {
        Jwk {
            kty: "EC".to_string(),
            kid: Some("puk_fd_enc".to_string()),
            key_use: Some("enc".to_string()),
            alg: Some("ECDH-ES".to_string()),
            n: None,
            e: None,
            crv: Some("P-256".to_string()),
            x: Some("x-coord".to_string()),
            y: Some("y-coord".to_string()),
            x5c: None,
        }
    }

    #[test]
    fn test_find_key_and_first_signing_key() {
        let jwks = JwkSet::new(vec![
            enc_key(),
            Jwk::rsa("key-1", "n-1", "AQAB"),
            Jwk::rsa("key-2", "n-2", "AQAB"),
        ]);

        assert_eq!(jwks.find_key("key-2").unwrap().n.as_deref(), Some("n-2"));
        assert!(jwks.find_key("key-3").is_none());
        assert_eq!(
            jwks.first_signing_key().unwrap().kid.as_deref(),
            Some("key-1")
        );
    }

    #[test]
    fn test_key_without_use_is_signing_key() {
        let mut key = Jwk::rsa("k", "n", "AQAB");
        key.key_use = None;
        assert!(key.is_signing_key());
        assert!(!key.is_encryption_key());
        assert!(!key.is_tls_client_cert());
    }

    #[test]
    fn test_encryption_and_tls_selection() {
        let tls = Jwk::rsa("tls", "n", "AQAB").with_x5c(vec!["MIIB".to_string()]);
        let jwks = JwkSet::new(vec![Jwk::rsa("sig", "n", "AQAB"), tls.clone(), enc_key()]);

        assert_eq!(
            jwks.encryption_key().unwrap().kid.as_deref(),
            Some("puk_fd_enc")
        );
        assert_eq!(jwks.tls_client_certs(), vec![&tls]);
        assert_eq!(tls.leaf_certificate(), Some("MIIB"));
    }

    #[test]
    fn test_empty_x5c_is_not_a_tls_cert() {
        let key = Jwk::rsa("tls", "n", "AQAB").with_x5c(vec![]);
        assert!(!key.is_tls_client_cert());
    }

    #[test]
    fn test_algorithm_selection() {
        assert_eq!(
            Jwk::rsa("k", "n", "AQAB").algorithm().unwrap(),
            Algorithm::RS256
        );

        let mut ec = enc_key();
        ec.alg = None;
        assert_eq!(ec.algorithm().unwrap(), Algorithm::ES256);

        let mut mismatched = Jwk::rsa("k", "n", "AQAB");
        mismatched.alg = Some("ES256".to_string());
        assert!(matches!(
            mismatched.algorithm(),
            Err(AuthError::InvalidAlgorithm(_))
        ));
    }

    #[test]
    fn test_to_decoding_key_missing_components() {
        let mut key = Jwk::rsa("k", "n", "AQAB");
        key.n = None;
        assert!(matches!(
            key.to_decoding_key(),
            Err(AuthError::InvalidKey(_))
        ));

        let mut ec = enc_key();
        ec.crv = Some("P-384".to_string());
        assert!(matches!(ec.to_decoding_key(), Err(AuthError::InvalidKey(_))));
    }

    #[test]
    fn test_jwk_serialization_renames_use() {
        let json = serde_json::to_string(&Jwk::rsa("key-1", "modulus", "AQAB")).unwrap();
        assert!(json.contains("\"use\":\"sig\""));
        assert!(json.contains("\"kid\":\"key-1\""));
        assert!(!json.contains("x5c"));
    }

    #[test]
    fn test_jwks_deserialization() {
        let json = r#"{
            "keys": [
                {"kty": "RSA", "kid": "key-1", "use": "sig", "alg": "RS256", "n": "abc", "e": "AQAB"},
                {"kty": "EC", "kid": "enc", "use": "enc", "crv": "P-256", "x": "x", "y": "y"}
            ]
        }"#;

        let jwks: JwkSet = serde_json::from_str(json).unwrap();
        assert_eq!(jwks.keys.len(), 2);
        assert_eq!(jwks.keys[1].key_use.as_deref(), Some("enc"));
    }
}
