//! mTLS client certificate handling.
//!
//! The TLS terminator forwards the presented certificate as PEM in a request
//! header, either verbatim or percent-encoded. Certificates are compared by
//! the SHA-256 fingerprint of their DER encoding.

use crate::error::{FederationError, FederationResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use fedidp_auth::Jwk;
use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Header carrying the client certificate.
pub const CLIENT_CERT_HEADER: &str = "x-ssl-client-cert";

/// Decode the forwarded PEM certificate into DER bytes.
pub fn parse_client_cert_header(value: &str) -> FederationResult<Vec<u8>> {
    let decoded = if value.contains("-----BEGIN") {
        value.to_string()
    } else {
        percent_decode_str(value)
            .decode_utf8()
            .map_err(|e| FederationError::InvalidRequest(format!("Invalid client certificate encoding: {e}")))?
            .into_owned()
    };

    let pem_data = ::pem::parse(decoded.trim())
        .map_err(|e| FederationError::InvalidRequest(format!("Failed to parse client certificate PEM: {e}")))?;
    Ok(pem_data.contents().to_vec())
}

/// SHA-256 fingerprint of a DER certificate, colon-separated upper-case hex.
#[must_use]
pub fn calculate_fingerprint(cert_der: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cert_der);
    let result = hasher.finalize();

    result
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Check the presented certificate against the leaf certificates of the
/// published keys.
pub fn matches_any(presented_der: &[u8], published: &[Jwk]) -> bool {
    let presented = calculate_fingerprint(presented_der);

    published
        .iter()
        .filter_map(Jwk::leaf_certificate)
        .filter_map(|leaf| STANDARD.decode(leaf).ok())
        .any(|der| {
            let fingerprint = calculate_fingerprint(&der);
            debug!(presented = %presented, published = %fingerprint, "Comparing client certificate");
            fingerprint == presented
        })
}
