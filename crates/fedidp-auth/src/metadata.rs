//! Federation metadata carried in the `metadata` claim of entity statements.
//!
//! The claim is a JSON object keyed by entity role. Each role is decoded on
//! demand into its typed variant; a missing role is reported as a missing
//! claim with the full path (e.g. `metadata.openid_relying_party`).

use crate::error::AuthError;
use crate::jwks::JwkSet;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Roles an entity can declare metadata for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRole {
    FederationEntity,
    OpenidProvider,
    OpenidRelyingParty,
}

impl EntityRole {
    /// The key of this role inside the `metadata` object.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::FederationEntity => "federation_entity",
            Self::OpenidProvider => "openid_provider",
            Self::OpenidRelyingParty => "openid_relying_party",
        }
    }
}

/// Metadata of a federation participant (trust anchor, IDP or RP).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FederationEntityMetadata {
    /// Endpoint answering `?iss=..&sub=..` fetch requests (trust anchor only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub federation_fetch_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage_uri: Option<String>,
}

/// Metadata of an OpenID provider (this IDP).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenidProviderMetadata {
    pub issuer: String,
    pub pushed_authorization_request_endpoint: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_jwks_uri: Option<String>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub acr_values_supported: Vec<String>,
    #[serde(default)]
    pub response_types_supported: Vec<String>,
    #[serde(default)]
    pub grant_types_supported: Vec<String>,
    #[serde(default)]
    pub require_pushed_authorization_requests: bool,
    #[serde(default)]
    pub token_endpoint_auth_methods_supported: Vec<String>,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type_supported: Option<String>,
}

/// Metadata of a relying party ("Fachdienst").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelyingPartyMetadata {
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// Space-separated list of scopes the relying party may request.
    #[serde(default)]
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<JwkSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_jwks_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
}

impl RelyingPartyMetadata {
    /// Declared scopes, split on whitespace.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }

    #[must_use]
    pub fn allows_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }
}

/// Typed metadata of a single role.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityMetadata {
    FederationEntity(FederationEntityMetadata),
    OpenidProvider(OpenidProviderMetadata),
    OpenidRelyingParty(RelyingPartyMetadata),
}

impl EntityMetadata {
    #[must_use]
    pub fn role(&self) -> EntityRole {
        match self {
            Self::FederationEntity(_) => EntityRole::FederationEntity,
            Self::OpenidProvider(_) => EntityRole::OpenidProvider,
            Self::OpenidRelyingParty(_) => EntityRole::OpenidRelyingParty,
        }
    }

    /// Decode the metadata of `role` from a generic `metadata` object.
    ///
    /// # Errors
    ///
    /// - `AuthError::MissingClaim` if the role (or the metadata object) is absent
    /// - `AuthError::InvalidClaim` if the role entry has the wrong shape
    pub fn decode(metadata: Option<&Value>, role: EntityRole) -> Result<Self, AuthError> {
        let entry = metadata
            .and_then(|m| m.get(role.key()))
            .filter(|v| !v.is_null())
            .ok_or_else(|| AuthError::MissingClaim(format!("metadata.{}", role.key())))?;

        Ok(match role {
            EntityRole::FederationEntity => Self::FederationEntity(decode_entry(entry, role)?),
            EntityRole::OpenidProvider => Self::OpenidProvider(decode_entry(entry, role)?),
            EntityRole::OpenidRelyingParty => {
                Self::OpenidRelyingParty(decode_entry(entry, role)?)
            }
        })
    }

    /// Assemble a `metadata` claim object from typed entries.
    pub fn to_claim(entries: &[EntityMetadata]) -> Result<Value, AuthError> {
        let mut map = Map::new();
        for entry in entries {
            let value = match entry {
                Self::FederationEntity(m) => serde_json::to_value(m),
                Self::OpenidProvider(m) => serde_json::to_value(m),
                Self::OpenidRelyingParty(m) => serde_json::to_value(m),
            }
            .map_err(|e| AuthError::InvalidClaim {
                claim: format!("metadata.{}", entry.role().key()),
                reason: e.to_string(),
            })?;
            map.insert(entry.role().key().to_string(), value);
        }
        Ok(Value::Object(map))
    }
}

fn decode_entry<T: DeserializeOwned>(entry: &Value, role: EntityRole) -> Result<T, AuthError> {
    T::deserialize(entry).map_err(|e| AuthError::InvalidClaim {
        claim: format!("metadata.{}", role.key()),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_relying_party() {
        let metadata = json!({
            "openid_relying_party": {
                "redirect_uris": ["https://fachdienst.example/callback"],
                "scope": "openid urn:telematik:versicherter",
                "signed_jwks_uri": "https://fachdienst.example/jws.json"
            }
        });

        let decoded =
            EntityMetadata::decode(Some(&metadata), EntityRole::OpenidRelyingParty).unwrap();
        let EntityMetadata::OpenidRelyingParty(rp) = decoded else {
            panic!("expected relying party metadata");
        };
        assert!(rp.allows_redirect_uri("https://fachdienst.example/callback"));
        assert!(!rp.allows_redirect_uri("https://evil.example/callback"));
        assert_eq!(
            rp.scopes().collect::<Vec<_>>(),
            vec!["openid", "urn:telematik:versicherter"]
        );
    }

    #[test]
    fn test_missing_role_reports_path() {
        let metadata = json!({ "federation_entity": { "name": "RP" } });
        let err = EntityMetadata::decode(Some(&metadata), EntityRole::OpenidRelyingParty)
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingClaim(ref p) if p == "metadata.openid_relying_party"));

        let err = EntityMetadata::decode(None, EntityRole::FederationEntity).unwrap_err();
        assert!(matches!(err, AuthError::MissingClaim(_)));
    }

    #[test]
    fn test_wrong_shape_is_invalid_claim() {
        let metadata = json!({ "openid_relying_party": { "redirect_uris": "not-a-list" } });
        let err = EntityMetadata::decode(Some(&metadata), EntityRole::OpenidRelyingParty)
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidClaim { .. }));
    }

    #[test]
    fn test_to_claim_keys_by_role() {
        let claim = EntityMetadata::to_claim(&[EntityMetadata::FederationEntity(
            FederationEntityMetadata {
                name: Some("IDP".to_string()),
                ..Default::default()
            },
        )])
        .unwrap();
        assert_eq!(claim["federation_entity"]["name"], "IDP");
        assert!(claim.get("federation_entity").unwrap().get("contacts").is_none());
    }
}
