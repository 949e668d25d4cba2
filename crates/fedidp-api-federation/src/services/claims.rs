//! Claims and assurance-level negotiation.
//!
//! Turns the `claims` request parameter and the requested scopes into the
//! set of essential and optional user claims plus validated `acr`/`amr`
//! requirements.

use crate::error::{FederationError, FederationResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Claims a relying party may request.
pub const ALLOWED_CLAIMS: &[&str] = &[
    "urn:telematik:claims:profession",
    "urn:telematik:claims:given_name",
    "urn:telematik:claims:organization",
    "urn:telematik:claims:id",
    "urn:telematik:claims:email",
    "urn:telematik:claims:display_name",
    "urn:telematik:claims:alter",
    "urn:telematik:claims:geschlecht",
    "urn:telematik:claims:family_name",
    "birthdate",
];

pub const ACR_HIGH: &str = "gematik-ehealth-loa-high";
pub const ACR_SUBSTANTIAL: &str = "gematik-ehealth-loa-substantial";

/// `amr` values compatible with [`ACR_HIGH`].
pub const AMR_HIGH: &[&str] = &[
    "urn:telematik:auth:eGK",
    "urn:telematik:auth:eID",
    "urn:telematik:auth:sso",
];

/// `amr` values compatible with [`ACR_SUBSTANTIAL`].
pub const AMR_SUBSTANTIAL: &[&str] = &[
    "urn:telematik:auth:mEW",
    "urn:telematik:auth:guest:eGK",
    "urn:telematik:auth:other",
];

pub const SCOPE_OPENID: &str = "openid";

/// Scopes this IDP can serve, with the claims each one implies.
const SCOPE_CLAIMS: &[(&str, &[&str])] = &[
    (SCOPE_OPENID, &[]),
    (
        "urn:telematik:versicherter",
        &[
            "urn:telematik:claims:profession",
            "urn:telematik:claims:organization",
            "urn:telematik:claims:id",
        ],
    ),
    (
        "urn:telematik:display_name",
        &["urn:telematik:claims:display_name"],
    ),
    ("urn:telematik:email", &["urn:telematik:claims:email"]),
    ("urn:telematik:alter", &["urn:telematik:claims:alter"]),
    ("urn:telematik:geschlecht", &["urn:telematik:claims:geschlecht"]),
    ("urn:telematik:given_name", &["urn:telematik:claims:given_name"]),
    ("urn:telematik:family_name", &["urn:telematik:claims:family_name"]),
    ("urn:telematik:geburtsdatum", &["birthdate"]),
];

/// All scopes with a claims mapping, in declaration order.
#[must_use]
pub fn default_supported_scopes() -> Vec<String> {
    SCOPE_CLAIMS.iter().map(|(scope, _)| (*scope).to_string()).collect()
}

/// Claims implied by a single scope; unknown scopes imply none.
#[must_use]
pub fn claims_for_scope(scope: &str) -> &'static [&'static str] {
    SCOPE_CLAIMS
        .iter()
        .find(|(name, _)| *name == scope)
        .map(|(_, claims)| *claims)
        .unwrap_or(&[])
}

/// Validate the space-separated `acr_values` PAR parameter.
pub fn validate_acr_values(acr_values: &str) -> FederationResult<Vec<String>> {
    let values: Vec<String> = acr_values.split_whitespace().map(str::to_string).collect();
    if values.is_empty() {
        return Err(FederationError::InvalidAcrValue(
            "acr_values must not be empty".to_string(),
        ));
    }
    for value in &values {
        if !is_known_acr(value) {
            return Err(FederationError::InvalidAcrValue(value.clone()));
        }
    }
    Ok(values)
}

/// `amr` values that may accompany `acr`.
#[must_use]
pub fn amr_for_acr(acr: &str) -> &'static [&'static str] {
    match acr {
        ACR_HIGH => AMR_HIGH,
        ACR_SUBSTANTIAL => AMR_SUBSTANTIAL,
        _ => &[],
    }
}

fn is_known_acr(value: &str) -> bool {
    value == ACR_HIGH || value == ACR_SUBSTANTIAL
}

fn is_known_amr(value: &str) -> bool {
    AMR_HIGH.contains(&value) || AMR_SUBSTANTIAL.contains(&value)
}

/// Negotiated claims of one authorization session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsInfo {
    pub essential_claims: BTreeSet<String>,
    pub optional_claims: BTreeSet<String>,
    pub acr_values: BTreeSet<String>,
    pub amr_values: BTreeSet<String>,
}

impl ClaimsInfo {
    /// Parse the `claims` request parameter.
    ///
    /// An absent or blank parameter yields an empty result.
    pub fn parse(claims: Option<&str>) -> FederationResult<Self> {
        let mut info = Self::default();
        let Some(raw) = claims.map(str::trim).filter(|c| !c.is_empty()) else {
            return Ok(info);
        };

        let value: Value = serde_json::from_str(raw)
            .map_err(|e| FederationError::InvalidClaimsStructure(format!("not JSON: {e}")))?;
        let id_token = value
            .get("id_token")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                FederationError::InvalidClaimsStructure(
                    "expected an object with member id_token".to_string(),
                )
            })?;

        for (name, request) in id_token {
            match name.as_str() {
                "acr" => info.acr_values = assurance_values(name, request, is_known_acr)?,
                "amr" => info.amr_values = assurance_values(name, request, is_known_amr)?,
                _ => info.add_requested_claim(name, request)?,
            }
        }

        info.check_acr_amr_coupling()?;
        Ok(info)
    }

    /// Add claims implied by scopes as optional, never downgrading an
    /// essential claim.
    pub fn add_claims_from_scope<I, S>(&mut self, claims: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for claim in claims {
            let claim = claim.into();
            if !self.essential_claims.contains(&claim) {
                self.optional_claims.insert(claim);
            }
        }
    }

    /// Add the claims implied by every scope in a space-separated list.
    pub fn add_claims_from_scopes(&mut self, scope: &str) {
        for scope in scope.split_whitespace() {
            self.add_claims_from_scope(claims_for_scope(scope).iter().copied());
        }
    }

    /// Essential and optional claims together.
    pub fn requested_claims(&self) -> impl Iterator<Item = &String> {
        self.essential_claims.iter().chain(self.optional_claims.iter())
    }

    #[must_use]
    pub fn is_requested(&self, claim: &str) -> bool {
        self.essential_claims.contains(claim) || self.optional_claims.contains(claim)
    }

    /// Narrow the acceptable `acr` values by the `acr_values` PAR parameter.
    ///
    /// Without an essential `acr` claim the parameter becomes the acceptable
    /// set; otherwise the two are intersected and must overlap.
    pub fn merge_acr_values(&mut self, acr_values: &[String]) -> FederationResult<()> {
        if acr_values.is_empty() {
            return Ok(());
        }
        let requested: BTreeSet<String> = acr_values.iter().cloned().collect();
        if self.acr_values.is_empty() {
            self.acr_values = requested;
        } else {
            self.acr_values = self.acr_values.intersection(&requested).cloned().collect();
            if self.acr_values.is_empty() {
                return Err(FederationError::InvalidAcrValue(
                    "acr_values do not overlap the essential acr claim".to_string(),
                ));
            }
        }
        self.check_acr_amr_coupling()
    }

    /// The `acr` to authenticate at: HIGH unless only SUBSTANTIAL is acceptable.
    #[must_use]
    pub fn preferred_acr(&self) -> &'static str {
        if self.acr_values.is_empty() || self.acr_values.contains(ACR_HIGH) {
            ACR_HIGH
        } else {
            ACR_SUBSTANTIAL
        }
    }

    /// Whether an authentication at `acr` by `amr` meets the negotiated
    /// requirements.
    #[must_use]
    pub fn is_satisfied_by(&self, acr: &str, amr: &[String]) -> bool {
        let compatible = amr_for_acr(acr);
        let acr_ok = self.acr_values.is_empty() || self.acr_values.contains(acr);
        let amr_ok = self.amr_values.is_empty() || amr.iter().any(|m| self.amr_values.contains(m));
        acr_ok && amr_ok && amr.iter().all(|m| compatible.contains(&m.as_str()))
    }

    fn add_requested_claim(&mut self, name: &str, request: &Value) -> FederationResult<()> {
        if !ALLOWED_CLAIMS.contains(&name) {
            return Err(FederationError::UnsupportedClaim(name.to_string()));
        }

        let essential = match request {
            Value::Null => false,
            Value::Object(members) => {
                if members.contains_key("value") || members.contains_key("values") {
                    return Err(FederationError::UnexpectedValueConstraint(name.to_string()));
                }
                is_essential(members)
            }
            _ => {
                return Err(FederationError::InvalidClaimsStructure(format!(
                    "request for {name} must be null or an object"
                )))
            }
        };

        if essential {
            self.optional_claims.remove(name);
            self.essential_claims.insert(name.to_string());
        } else if !self.essential_claims.contains(name) {
            self.optional_claims.insert(name.to_string());
        }
        Ok(())
    }

    fn check_acr_amr_coupling(&self) -> FederationResult<()> {
        let high = self.acr_values.contains(ACR_HIGH);
        let substantial = self.acr_values.contains(ACR_SUBSTANTIAL);

        let (allowed, level) = match (high, substantial) {
            (true, false) => (AMR_HIGH, ACR_HIGH),
            (false, true) => (AMR_SUBSTANTIAL, ACR_SUBSTANTIAL),
            _ => return Ok(()),
        };

        if let Some(amr) = self
            .amr_values
            .iter()
            .find(|amr| !allowed.contains(&amr.as_str()))
        {
            return Err(FederationError::InvalidAcrAmrCombination(format!(
                "{amr} is not permitted with {level}"
            )));
        }
        Ok(())
    }
}

fn is_essential(members: &Map<String, Value>) -> bool {
    members.get("essential").and_then(Value::as_bool) == Some(true)
}

/// Values of an essential `acr`/`amr` request; non-essential requests are ignored.
fn assurance_values(
    name: &str,
    request: &Value,
    known: fn(&str) -> bool,
) -> FederationResult<BTreeSet<String>> {
    let Some(members) = request.as_object().filter(|m| is_essential(m)) else {
        return Ok(BTreeSet::new());
    };

    let mut values = BTreeSet::new();
    if let Some(value) = members.get("value") {
        values.insert(assurance_value(name, value)?);
    }
    if let Some(list) = members.get("values") {
        let list = list.as_array().ok_or_else(|| {
            FederationError::InvalidClaimsStructure(format!("{name}.values must be an array"))
        })?;
        for value in list {
            values.insert(assurance_value(name, value)?);
        }
    }

    for value in &values {
        if !known(value) {
            return Err(if name == "acr" {
                FederationError::InvalidAcrValue(value.clone())
            } else {
                FederationError::InvalidAmrValue(value.clone())
            });
        }
    }
    Ok(values)
}

fn assurance_value(name: &str, value: &Value) -> FederationResult<String> {
    value.as_str().map(str::to_string).ok_or_else(|| {
        FederationError::InvalidClaimsStructure(format!("{name} values must be strings"))
    })
}
