//! Key material and statement builders shared by the unit tests.

use fedidp_auth::{Jwk, StatementSigner, TYP_ENTITY_STATEMENT};
use serde_json::{json, Value};

pub use fedidp_auth::test_keys::{
    other_public_jwk as other_jwk, public_jwk, TEST_MODULUS, TEST_PRIVATE_KEY,
};

/// Reference instant of the fixed-clock tests.
pub const NOW: i64 = 1_700_000_000;

pub fn statement_signer() -> StatementSigner {
    StatementSigner::from_pem("test-key", TEST_PRIVATE_KEY, public_jwk("test-key"))
        .expect("test key is valid")
}

pub fn sign_statement(claims: &Value) -> String {
    statement_signer()
        .sign(TYP_ENTITY_STATEMENT, claims, false)
        .expect("signing succeeds")
}

/// Claims of the trust anchor's statement about `rp`, carrying `rp_key`.
pub fn anchor_statement_claims(anchor: &str, rp: &str, rp_key: &Jwk, exp: i64) -> Value {
    json!({
        "iss": anchor,
        "sub": rp,
        "iat": exp - 3600,
        "exp": exp,
        "jwks": { "keys": [rp_key] },
    })
}

/// Claims of a relying party's self-issued statement.
pub fn rp_statement_claims(rp: &str, anchor: &str, rp_metadata: Value, exp: i64) -> Value {
    json!({
        "iss": rp,
        "sub": rp,
        "iat": exp - 3600,
        "exp": exp,
        "jwks": { "keys": [public_jwk("puk_fd_sig")] },
        "authority_hints": [anchor],
        "metadata": { "openid_relying_party": rp_metadata },
    })
}
