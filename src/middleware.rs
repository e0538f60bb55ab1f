use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::{app_error::AppError, app_state::AppState, auth, types::Role};

/// Identity of the caller, inserted as a request extension by [`authorization`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i32,
    pub role: Role,
}

/// Validates the bearer token and exposes the caller as `Extension<AuthUser>`.
pub async fn authorization(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Not authorized, no token".into()))?;

    let claims = auth::decode_token(token, &state.config.auth.jwt_secret)?;
    let id = claims
        .sub
        .parse::<i32>()
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;

    req.extensions_mut().insert(AuthUser {
        id,
        role: claims.role,
    });
    Ok(next.run(req).await)
}

/// Must run inside [`authorization`].
pub async fn buyers_authorization(req: Request, next: Next) -> Result<Response, AppError> {
    require_role(&req, Role::Buyer, "Access restricted to buyers")?;
    Ok(next.run(req).await)
}

/// Must run inside [`authorization`].
pub async fn suppliers_authorization(req: Request, next: Next) -> Result<Response, AppError> {
    require_role(&req, Role::Supplier, "Access restricted to suppliers")?;
    Ok(next.run(req).await)
}

fn require_role(req: &Request, role: Role, message: &str) -> Result<(), AppError> {
    match req.extensions().get::<AuthUser>() {
        Some(user) if user.role == role => Ok(()),
        Some(_) => Err(AppError::ForbiddenResource(message.into())),
        None => Err(AppError::Unauthorized("Not authorized, no token".into())),
    }
}
