//! Authentication middleware for Axum
//!
//! `auth_middleware` validates the bearer token and attaches an
//! [`AuthenticatedUser`] to request extensions. The `require_*` gates
//! layer on top of it and match on the closed [`UserRole`] set, so a
//! role added later fails to compile until every gate decides on it.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::jwt::{verify_token, AuthError, Claims, JwtConfig};
use crate::infrastructure::database::entities::user::UserRole;

/// Authentication state for the token-validating middleware
#[derive(Clone)]
pub struct AuthState {
    pub jwt_config: JwtConfig,
}

/// Authenticated caller information extracted from a verified token
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub username: String,
    pub role: UserRole,
}

impl AuthenticatedUser {
    /// Build from verified claims. `None` when the role claim is outside
    /// the closed set (a token minted by an incompatible deployment).
    pub fn from_claims(claims: Claims) -> Option<Self> {
        Some(Self {
            user_id: claims.sub,
            username: claims.username,
            role: UserRole::parse(&claims.role)?,
        })
    }
}

/// Extract token from Authorization header
fn extract_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// JWT authentication middleware - requires valid token
pub async fn auth_middleware(
    State(auth_state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(String::from);
    let Some(auth_header) = auth_header else {
        return auth_error_response(AuthError::MissingToken);
    };

    let Some(token) = extract_token(&auth_header) else {
        return auth_error_response(AuthError::InvalidToken);
    };

    match verify_token(token, &auth_state.jwt_config) {
        Ok(claims) => {
            if claims.is_expired() {
                return auth_error_response(AuthError::ExpiredToken);
            }

            let Some(user) = AuthenticatedUser::from_claims(claims) else {
                return auth_error_response(AuthError::InvalidToken);
            };
            request.extensions_mut().insert(user);

            next.run(request).await
        }
        Err(_) => auth_error_response(AuthError::InvalidToken),
    }
}

/// Create an authentication error response
pub fn auth_error_response(error: AuthError) -> Response {
    let (status, message) = match error {
        AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing authentication token"),
        AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid authentication token"),
        AuthError::ExpiredToken => (StatusCode::UNAUTHORIZED, "Token has expired"),
        AuthError::InsufficientPermissions => (StatusCode::FORBIDDEN, "Insufficient permissions"),
        AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "Invalid credentials"),
        AuthError::UserNotFound => (StatusCode::NOT_FOUND, "User not found"),
        AuthError::InvalidDeviceKey => (StatusCode::UNAUTHORIZED, "Invalid device key"),
    };

    let body = Json(json!({
        "success": false,
        "error": message
    }));

    (status, body).into_response()
}

/// Admin-only gate - must be layered inside `auth_middleware`
pub async fn require_admin(request: Request<Body>, next: Next) -> Response {
    let role = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.role);

    match role {
        Some(UserRole::Admin) => next.run(request).await,
        Some(UserRole::Doctor | UserRole::Pharmacist) => {
            auth_error_response(AuthError::InsufficientPermissions)
        }
        None => auth_error_response(AuthError::MissingToken),
    }
}

/// Doctor-only gate
pub async fn require_doctor(request: Request<Body>, next: Next) -> Response {
    let role = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.role);

    match role {
        Some(UserRole::Doctor) => next.run(request).await,
        Some(UserRole::Admin | UserRole::Pharmacist) => {
            auth_error_response(AuthError::InsufficientPermissions)
        }
        None => auth_error_response(AuthError::MissingToken),
    }
}

/// Pharmacist-only gate
pub async fn require_pharmacist(request: Request<Body>, next: Next) -> Response {
    let role = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.role);

    match role {
        Some(UserRole::Pharmacist) => next.run(request).await,
        Some(UserRole::Admin | UserRole::Doctor) => {
            auth_error_response(AuthError::InsufficientPermissions)
        }
        None => auth_error_response(AuthError::MissingToken),
    }
}

/// Doctors and pharmacists: the clinical staff who handle prescriptions
/// and scan patient cards
pub async fn require_clinical_staff(request: Request<Body>, next: Next) -> Response {
    let role = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.role);

    match role {
        Some(UserRole::Doctor | UserRole::Pharmacist) => next.run(request).await,
        Some(UserRole::Admin) => auth_error_response(AuthError::InsufficientPermissions),
        None => auth_error_response(AuthError::MissingToken),
    }
}

/// Admins and doctors: full patient record access
pub async fn require_records_access(request: Request<Body>, next: Next) -> Response {
    let role = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.role);

    match role {
        Some(UserRole::Admin | UserRole::Doctor) => next.run(request).await,
        Some(UserRole::Pharmacist) => auth_error_response(AuthError::InsufficientPermissions),
        None => auth_error_response(AuthError::MissingToken),
    }
}

/// Admins and pharmacists: dispenser fleet management
pub async fn require_fleet_access(request: Request<Body>, next: Next) -> Response {
    let role = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.role);

    match role {
        Some(UserRole::Admin | UserRole::Pharmacist) => next.run(request).await,
        Some(UserRole::Doctor) => auth_error_response(AuthError::InsufficientPermissions),
        None => auth_error_response(AuthError::MissingToken),
    }
}
