use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use notice_types::api::Claims;
use notice_types::models::Role;

use crate::state::AppState;

/// Extract and validate the bearer JWT; handlers read the claims from the
/// request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = decode_token(bearer.token(), &state.jwt_secret)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, StatusCode> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        debug!("Rejected token: {}", e);
        StatusCode::UNAUTHORIZED
    })
}

/// 403 unless the token carries `role`.
pub fn require_role(claims: &Claims, role: Role) -> Result<(), StatusCode> {
    if claims.role == role {
        Ok(())
    } else {
        debug!("Principal {} is {:?}, needs {:?}", claims.sub, claims.role, role);
        Err(StatusCode::FORBIDDEN)
    }
}
