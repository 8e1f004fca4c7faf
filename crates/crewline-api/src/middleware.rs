use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{DecodingKey, Validation, decode};

use crewline_types::api::Claims;

use crate::AppState;
use crate::error::{ApiError, ApiResult};

/// Verify a JWT minted by the external identity collaborator. No credential
/// checks happen here; a valid signature and a positive subject id is the
/// whole contract.
pub fn decode_claims(token: &str, secret: &str) -> ApiResult<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Authorization("invalid token".into()))?;

    if data.claims.sub <= 0 {
        return Err(ApiError::Validation("invalid subject id".into()));
    }
    Ok(data.claims)
}

/// Extract and validate the bearer token, then stash the claims as a request
/// extension for the handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Authorization("missing authorization header".into()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Authorization("malformed authorization header".into()))?;

    let claims = decode_claims(token, &state.jwt_secret)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
