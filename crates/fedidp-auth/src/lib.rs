//! JOSE layer of the federated IDP.
//!
//! This crate provides:
//! - JWK and JWK set model with key selection by use
//! - Entity statement parsing and verification (RS256, ES256)
//! - Typed federation metadata decoded per entity role
//! - Compact JWS signing for statements, key sets and ID tokens
//!
//! # Example
//!
//! ```rust,ignore
//! use fedidp_auth::{EntityStatement, StatementSigner, TYP_ENTITY_STATEMENT};
//!
//! let token = signer.sign(TYP_ENTITY_STATEMENT, &claims, true)?;
//!
//! let statement = EntityStatement::parse(&token)?;
//! statement.verify(&trust_anchor_key)?;
//! let rp = statement.relying_party_metadata()?;
//! ```

mod error;
mod jwks;
mod metadata;
mod signer;
mod statement;

#[cfg(any(test, feature = "test-support"))]
pub mod test_keys;

// Re-export public API
pub use error::AuthError;
pub use jwks::{Jwk, JwkSet};
pub use metadata::{
    EntityMetadata, EntityRole, FederationEntityMetadata, OpenidProviderMetadata,
    RelyingPartyMetadata,
};
pub use signer::{StatementSigner, TYP_ENTITY_STATEMENT, TYP_JWK_SET, TYP_JWT};
pub use statement::{EntityStatement, EntityStatementClaims, SignedJwks, SignedJwksClaims};
