//! Federation document handlers.

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
};
use tracing::instrument;

use crate::error::FederationResult;
use crate::router::FederationState;

/// Content type of a self-signed entity statement.
pub const ENTITY_STATEMENT_CONTENT_TYPE: &str = "application/entity-statement+jwt";

/// Content type of the signed JWKS.
pub const JOSE_CONTENT_TYPE: &str = "application/jose";

/// Serve the IDP's self-signed entity statement.
///
/// GET /.well-known/openid-federation
#[instrument(skip(state))]
pub async fn entity_statement(
    State(state): State<FederationState>,
) -> FederationResult<impl IntoResponse> {
    let statement = state.entity_statement.entity_statement()?;
    Ok((
        [(header::CONTENT_TYPE, ENTITY_STATEMENT_CONTENT_TYPE)],
        statement,
    ))
}

/// Serve the signed JWKS referenced by `signed_jwks_uri`.
///
/// GET /jws.json
#[instrument(skip(state))]
pub async fn signed_jwks(State(state): State<FederationState>) -> FederationResult<impl IntoResponse> {
    let jwks = state.entity_statement.signed_jwks()?;
    Ok(([(header::CONTENT_TYPE, JOSE_CONTENT_TYPE)], jwks))
}
