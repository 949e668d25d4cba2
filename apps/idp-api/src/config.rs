//! Application configuration loaded from environment variables.
//!
//! Loading is fail-fast: required variables must be present and valid, or
//! the application exits with a clear error message.

use fedidp_auth::Jwk;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8083";

/// Default kid of the federation signing key.
pub const DEFAULT_SIGNING_KID: &str = "puk_idp_sig";

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,fedidp=debug";

/// Configuration errors that can occur during environment loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("Failed to read {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: String,
    pub issuer: String,
    pub fedmaster_issuer: String,
    pub fedmaster_fetch_endpoint: String,
    pub fedmaster_public_jwk: Jwk,
    pub signing_kid: String,
    pub signing_key_file: PathBuf,
    pub signing_public_jwk: Jwk,
    /// Standard base64 DER certificates, leaf first.
    pub signing_x5c: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub upstream_timeout: Duration,
    pub id_token_ttl_secs: i64,
    pub require_client_cert: bool,
    pub entity_name: String,
    pub contacts: Vec<String>,
    pub rust_log: String,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// # Required Variables
    ///
    /// - `IDP_ISSUER` - Issuer URL of this IDP
    /// - `FEDMASTER_ISSUER` - Issuer URL of the federation master
    /// - `FEDMASTER_PUBLIC_JWK` - Pinned signing key of the federation master (JSON)
    /// - `IDP_SIGNING_KEY_FILE` - PEM file of the federation signing key
    /// - `IDP_SIGNING_PUBLIC_JWK` - Public half of the signing key (JSON)
    ///
    /// # Optional Variables
    ///
    /// - `IDP_LISTEN_ADDR` - Bind address (default: "0.0.0.0:8083")
    /// - `FEDMASTER_FETCH_ENDPOINT` - (default: "<FEDMASTER_ISSUER>/federation/fetch")
    /// - `IDP_SIGNING_KID` - (default: "puk_idp_sig")
    /// - `IDP_SIGNING_X5C` - Comma-separated certificate chain
    /// - `IDP_SCOPES_SUPPORTED` - Space-separated scopes
    /// - `UPSTREAM_TIMEOUT_SECS` - (default: 10)
    /// - `ID_TOKEN_TTL_SECS` - (default: 300)
    /// - `REQUIRE_CLIENT_CERT` - (default: true)
    /// - `IDP_ENTITY_NAME` - (default: "Federated IDP")
    /// - `IDP_CONTACTS` - Comma-separated contacts
    /// - `RUST_LOG` - Log level filter (default: "info,fedidp=debug")
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development only)
        let _ = dotenvy::dotenv();
        Self::from_reader(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_reader<F>(read: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| read(key).filter(|value| !value.trim().is_empty());
        let required =
            |key: &str| get(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));

        let issuer = required("IDP_ISSUER")?.trim_end_matches('/').to_string();
        let fedmaster_issuer = required("FEDMASTER_ISSUER")?
            .trim_end_matches('/')
            .to_string();
        let fedmaster_fetch_endpoint = get("FEDMASTER_FETCH_ENDPOINT")
            .unwrap_or_else(|| format!("{fedmaster_issuer}/federation/fetch"));
        let fedmaster_public_jwk = parse_jwk("FEDMASTER_PUBLIC_JWK", &required("FEDMASTER_PUBLIC_JWK")?)?;

        let signing_kid = get("IDP_SIGNING_KID").unwrap_or_else(|| DEFAULT_SIGNING_KID.to_string());
        let signing_key_file = PathBuf::from(required("IDP_SIGNING_KEY_FILE")?);
        let signing_public_jwk =
            parse_jwk("IDP_SIGNING_PUBLIC_JWK", &required("IDP_SIGNING_PUBLIC_JWK")?)?;
        let signing_x5c = get("IDP_SIGNING_X5C")
            .map(|value| split_list(&value, ','))
            .unwrap_or_default();

        let scopes_supported = get("IDP_SCOPES_SUPPORTED")
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_else(fedidp_api_federation::services::default_supported_scopes);
        if !scopes_supported.iter().any(|s| s == "openid") {
            return Err(ConfigError::InvalidValue {
                var: "IDP_SCOPES_SUPPORTED".to_string(),
                message: "Must contain openid".to_string(),
            });
        }

        let upstream_timeout = Duration::from_secs(parse_number(
            "UPSTREAM_TIMEOUT_SECS",
            get("UPSTREAM_TIMEOUT_SECS"),
            10,
        )?);
        let id_token_ttl_secs =
            parse_number("ID_TOKEN_TTL_SECS", get("ID_TOKEN_TTL_SECS"), 300)?;
        let require_client_cert =
            parse_bool("REQUIRE_CLIENT_CERT", get("REQUIRE_CLIENT_CERT"), true)?;

        Ok(Self {
            listen_addr: get("IDP_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            issuer,
            fedmaster_issuer,
            fedmaster_fetch_endpoint,
            fedmaster_public_jwk,
            signing_kid,
            signing_key_file,
            signing_public_jwk,
            signing_x5c,
            scopes_supported,
            upstream_timeout,
            id_token_ttl_secs,
            require_client_cert,
            entity_name: get("IDP_ENTITY_NAME").unwrap_or_else(|| "Federated IDP".to_string()),
            contacts: get("IDP_CONTACTS")
                .map(|value| split_list(&value, ','))
                .unwrap_or_default(),
            rust_log: get("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }

    /// Read the PEM signing key.
    pub fn read_signing_key(&self) -> Result<Vec<u8>, ConfigError> {
        let pem = std::fs::read(&self.signing_key_file).map_err(|source| ConfigError::KeyFile {
            path: self.signing_key_file.display().to_string(),
            source,
        })?;
        if !String::from_utf8_lossy(&pem).contains("-----BEGIN") {
            return Err(ConfigError::InvalidValue {
                var: "IDP_SIGNING_KEY_FILE".to_string(),
                message: "Must be PEM format (should contain -----BEGIN)".to_string(),
            });
        }
        Ok(pem)
    }
}

fn parse_jwk(var: &str, value: &str) -> Result<Jwk, ConfigError> {
    serde_json::from_str(value).map_err(|e| ConfigError::InvalidValue {
        var: var.to_string(),
        message: format!("Invalid JWK JSON: {e}"),
    })
}

fn split_list(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number<T: std::str::FromStr>(
    var: &str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var: var.to_string(),
            message: e.to_string(),
        }),
    }
}

fn parse_bool(var: &str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match value.as_deref().map(str::trim) {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue {
            var: var.to_string(),
            message: format!("Expected a boolean, got {other}"),
        }),
    }
}
