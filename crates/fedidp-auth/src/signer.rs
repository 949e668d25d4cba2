//! Compact JWS signing for federation statements, key sets and ID tokens.

use crate::error::AuthError;
use crate::jwks::{Jwk, JwkSet};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;

/// `typ` header of entity statements.
pub const TYP_ENTITY_STATEMENT: &str = "entity-statement+jwt";

/// `typ` header of signed JWK set documents.
pub const TYP_JWK_SET: &str = "jwk-set+json";

/// `typ` header of ID tokens.
pub const TYP_JWT: &str = "JWT";

/// Holds the private signing key together with its published public half.
#[derive(Clone)]
pub struct StatementSigner {
    kid: String,
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    public_jwk: Jwk,
    x5c: Option<Vec<String>>,
}

impl std::fmt::Debug for StatementSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementSigner")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl StatementSigner {
    /// Create a signer from a PEM private key and the matching public JWK.
    ///
    /// The algorithm is taken from the public JWK; its `kid` is overwritten
    /// with `kid` so the published key always matches the header.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidKey` if the PEM cannot be parsed or the key
    /// type is unsupported.
    pub fn from_pem(kid: impl Into<String>, pem: &[u8], public_jwk: Jwk) -> Result<Self, AuthError> {
        let kid = kid.into();
        let algorithm = public_jwk.algorithm()?;
        let encoding_key = match algorithm {
            Algorithm::RS256 => EncodingKey::from_rsa_pem(pem),
            Algorithm::ES256 => EncodingKey::from_ec_pem(pem),
            other => return Err(AuthError::InvalidAlgorithm(format!("{other:?}"))),
        }
        .map_err(|e| AuthError::InvalidKey(format!("Invalid private key: {e}")))?;

        let mut public_jwk = public_jwk;
        public_jwk.kid = Some(kid.clone());
        if public_jwk.key_use.is_none() {
            public_jwk.key_use = Some("sig".to_string());
        }

        Ok(Self {
            kid,
            algorithm,
            encoding_key,
            public_jwk,
            x5c: None,
        })
    }

    /// Attach the certificate chain sent in `x5c` headers.
    #[must_use]
    pub fn with_x5c(mut self, chain: Vec<String>) -> Self {
        self.x5c = if chain.is_empty() { None } else { Some(chain) };
        self
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    #[must_use]
    pub fn public_jwk(&self) -> &Jwk {
        &self.public_jwk
    }

    /// Public key set containing only this signer's key.
    #[must_use]
    pub fn public_jwks(&self) -> JwkSet {
        let mut jwk = self.public_jwk.clone();
        if jwk.x5c.is_none() {
            jwk.x5c.clone_from(&self.x5c);
        }
        JwkSet::new(vec![jwk])
    }

    /// Sign `claims` into a compact JWS with the given `typ` header.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SigningFailed` if serialization or signing fails.
    pub fn sign<T: Serialize>(
        &self,
        typ: &str,
        claims: &T,
        include_x5c: bool,
    ) -> Result<String, AuthError> {
        let mut header = Header::new(self.algorithm);
        header.typ = Some(typ.to_string());
        header.kid = Some(self.kid.clone());
        if include_x5c {
            header.x5c.clone_from(&self.x5c);
        }

        encode(&header, claims, &self.encoding_key)
            .map_err(|e| AuthError::SigningFailed(e.to_string()))
    }
}
