//! Middleware de autenticación JWT
//!
//! Verifica el Bearer token HS256 y exige el rol de la ruta. El usuario
//! autenticado queda en las extensions del request.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::models::user::UserRole;
use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::utils::jwt;

/// Usuario autenticado que se inyecta en las requests
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: String,
}

fn authenticate(state: &AppState, request: &Request) -> Result<AuthenticatedUser, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("authorization token required".to_string()))?;

    let claims = jwt::verify_token(token, state.config.jwt_secret.as_bytes())?;

    let user_id = Uuid::parse_str(&claims.user_id)
        .map_err(|_| AppError::Unauthorized("invalid user id in token".to_string()))?;

    Ok(AuthenticatedUser {
        user_id,
        role: claims.role,
    })
}

/// Rutas de pasajeros: rol PASSENGER
pub async fn passenger_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, &request)?;

    if user.role != UserRole::Passenger.as_str() {
        return Err(AppError::Forbidden(
            "passenger role required".to_string(),
        ));
    }

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Rutas de conductores: rol DRIVER. El id de la ruta se compara contra
/// el token en cada handler.
pub async fn driver_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, &request)?;

    if user.role != UserRole::Driver.as_str() {
        return Err(AppError::Forbidden("driver role required".to_string()));
    }

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
