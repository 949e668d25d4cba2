//! Authorization flow handlers: PAR, redemption and code exchange.

use axum::{
    extract::{
        rejection::{FormRejection, QueryRejection},
        Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Form, Json,
};
use tracing::instrument;

use crate::error::{FederationError, FederationResult};
use crate::models::{AuthorizeParams, PushedAuthorizationRequest, TokenRequest};
use crate::router::FederationState;
use crate::services::CLIENT_CERT_HEADER;

const NO_STORE: [(header::HeaderName, &str); 2] = [
    (header::CACHE_CONTROL, "no-store"),
    (header::PRAGMA, "no-cache"),
];

/// Accept a pushed authorization request.
///
/// POST /PAR_Auth
#[instrument(skip(state, request))]
pub async fn pushed_authorization(
    State(state): State<FederationState>,
    request: Result<Form<PushedAuthorizationRequest>, FormRejection>,
) -> FederationResult<impl IntoResponse> {
    let Form(request) = request?;
    let response = state.auth_flow.pushed_authorization(request).await?;
    Ok((StatusCode::CREATED, NO_STORE, Json(response)))
}

/// Redeem a `request_uri` and send the user agent back to the relying party.
///
/// GET /auth?request_uri=...
#[instrument(skip(state))]
pub async fn authorize(
    State(state): State<FederationState>,
    params: Result<Query<AuthorizeParams>, QueryRejection>,
) -> FederationResult<impl IntoResponse> {
    let Query(params) = params?;
    let request_uri = params
        .request_uri
        .filter(|uri| !uri.is_empty())
        .ok_or_else(|| FederationError::InvalidRequest("request_uri is required".to_string()))?;

    let location = state.auth_flow.redeem(&request_uri).await?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location.to_string())]))
}

/// Exchange an authorization code for an ID token.
///
/// POST /token
#[instrument(skip(state, headers, request))]
pub async fn token(
    State(state): State<FederationState>,
    headers: HeaderMap,
    request: Result<Form<TokenRequest>, FormRejection>,
) -> FederationResult<impl IntoResponse> {
    let Form(request) = request?;
    let client_cert = headers
        .get(CLIENT_CERT_HEADER)
        .map(|value| {
            value.to_str().map_err(|_| {
                FederationError::InvalidRequest("Invalid client certificate header".to_string())
            })
        })
        .transpose()?;

    let response = state.auth_flow.exchange_code(request, client_cert).await?;
    Ok((NO_STORE, Json(response)))
}
