//! Entity statement and signed JWK set codec.
//!
//! Parsing never establishes trust: it only splits the compact token and
//! decodes header and body. Trust comes from [`EntityStatement::verify`],
//! which checks the signature first and the expiry second.

use crate::error::AuthError;
use crate::jwks::{Jwk, JwkSet};
use crate::metadata::{
    EntityMetadata, EntityRole, FederationEntityMetadata, OpenidProviderMetadata,
    RelyingPartyMetadata,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{crypto, decode_header, Algorithm, Header};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body claims of an entity statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStatementClaims {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub jwks: JwkSet,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authority_hints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// A parsed (not yet trusted) entity statement.
#[derive(Debug, Clone)]
pub struct EntityStatement {
    raw: String,
    header: Header,
    claims: EntityStatementClaims,
}

impl EntityStatement {
    /// Parse a compact token without checking its signature.
    ///
    /// # Errors
    ///
    /// - `AuthError::MalformedToken` if the token is not a decodable JWS
    /// - `AuthError::InvalidAlgorithm` if the header names an unsupported algorithm
    /// - `AuthError::InvalidClaim` if `exp` is not after `iat`
    pub fn parse(token: &str) -> Result<Self, AuthError> {
        let (header, claims): (Header, EntityStatementClaims) = decode_parts(token)?;

        if claims.exp <= claims.iat {
            return Err(AuthError::InvalidClaim {
                claim: "exp".to_string(),
                reason: "must be after iat".to_string(),
            });
        }

        Ok(Self {
            raw: token.to_string(),
            header,
            claims,
        })
    }

    /// The compact serialization this statement was parsed from.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[must_use]
    pub fn claims(&self) -> &EntityStatementClaims {
        &self.claims
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.claims.iss
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.claims.sub
    }

    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.claims.exp
    }

    #[must_use]
    pub fn jwks(&self) -> &JwkSet {
        &self.claims.jwks
    }

    /// Fresh while `now < exp`.
    #[must_use]
    pub fn is_fresh_at(&self, now: i64) -> bool {
        now < self.claims.exp
    }

    /// Verify the signature with `key` and check expiry against the system clock.
    pub fn verify(&self, key: &Jwk) -> Result<(), AuthError> {
        self.verify_at(key, Utc::now().timestamp())
    }

    /// Verify the signature with `key`, then check `now < exp`.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidSignature` if the signature does not match `key`
    /// - `AuthError::Expired` if the statement is no longer fresh
    pub fn verify_at(&self, key: &Jwk, now: i64) -> Result<(), AuthError> {
        verify_signature(&self.raw, &self.header, key)?;
        if !self.is_fresh_at(now) {
            return Err(AuthError::Expired);
        }
        Ok(())
    }

    /// Decode the metadata declared for `role`.
    pub fn metadata(&self, role: EntityRole) -> Result<EntityMetadata, AuthError> {
        EntityMetadata::decode(self.claims.metadata.as_ref(), role)
    }

    pub fn relying_party_metadata(&self) -> Result<RelyingPartyMetadata, AuthError> {
        match self.metadata(EntityRole::OpenidRelyingParty)? {
            EntityMetadata::OpenidRelyingParty(m) => Ok(m),
            _ => Err(missing(EntityRole::OpenidRelyingParty)),
        }
    }

    pub fn federation_entity_metadata(&self) -> Result<FederationEntityMetadata, AuthError> {
        match self.metadata(EntityRole::FederationEntity)? {
            EntityMetadata::FederationEntity(m) => Ok(m),
            _ => Err(missing(EntityRole::FederationEntity)),
        }
    }

    pub fn openid_provider_metadata(&self) -> Result<OpenidProviderMetadata, AuthError> {
        match self.metadata(EntityRole::OpenidProvider)? {
            EntityMetadata::OpenidProvider(m) => Ok(m),
            _ => Err(missing(EntityRole::OpenidProvider)),
        }
    }
}

/// Body claims of a signed JWK set document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedJwksClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    pub keys: Vec<Jwk>,
}

/// A parsed signed JWK set (the document behind `signed_jwks_uri`).
#[derive(Debug, Clone)]
pub struct SignedJwks {
    raw: String,
    header: Header,
    claims: SignedJwksClaims,
}

impl SignedJwks {
    pub fn parse(token: &str) -> Result<Self, AuthError> {
        let (header, claims) = decode_parts(token)?;
        Ok(Self {
            raw: token.to_string(),
            header,
            claims,
        })
    }

    /// Signed key sets carry no expiry; only the signature is checked.
    pub fn verify(&self, key: &Jwk) -> Result<(), AuthError> {
        verify_signature(&self.raw, &self.header, key)
    }

    #[must_use]
    pub fn key_set(&self) -> JwkSet {
        JwkSet::new(self.claims.keys.clone())
    }
}

fn missing(role: EntityRole) -> AuthError {
    AuthError::MissingClaim(format!("metadata.{}", role.key()))
}

fn decode_parts<C: DeserializeOwned>(token: &str) -> Result<(Header, C), AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(AuthError::MalformedToken(
            "expected three non-empty segments".to_string(),
        ));
    }

    let header =
        decode_header(token).map_err(|e| AuthError::MalformedToken(format!("header: {e}")))?;
    match header.alg {
        Algorithm::RS256 | Algorithm::ES256 => {}
        other => return Err(AuthError::InvalidAlgorithm(format!("{other:?}"))),
    }

    let payload = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| AuthError::MalformedToken(format!("payload encoding: {e}")))?;
    let claims = serde_json::from_slice(&payload)
        .map_err(|e| AuthError::MalformedToken(format!("payload: {e}")))?;

    Ok((header, claims))
}

fn verify_signature(raw: &str, header: &Header, key: &Jwk) -> Result<(), AuthError> {
    let (signing_input, signature) = raw
        .rsplit_once('.')
        .ok_or_else(|| AuthError::MalformedToken("missing signature".to_string()))?;

    if key.algorithm()? != header.alg {
        return Err(AuthError::InvalidSignature);
    }
    let decoding_key = key.to_decoding_key()?;

    match crypto::verify(signature, signing_input.as_bytes(), &decoding_key, header.alg) {
        Ok(true) => Ok(()),
        Ok(false) | Err(_) => Err(AuthError::InvalidSignature),
    }
}
