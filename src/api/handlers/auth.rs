//! Authentication API handlers

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::api::dto::ApiResponse;
use crate::api::extract::ValidatedJson;
use crate::application::services::MailNotifier;
use crate::auth::jwt::{create_token, JwtConfig};
use crate::auth::middleware::AuthenticatedUser;
use crate::auth::password::{hash_password, verify_password};
use crate::infrastructure::database::entities::user::{self, UserRole};

/// Auth state for authentication handlers
#[derive(Clone)]
pub struct AuthHandlerState {
    pub db: sea_orm::DatabaseConnection,
    pub jwt_config: JwtConfig,
    pub mailer: Arc<dyn MailNotifier>,
}

/// Login request
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "email": "admin@mediflow.local",
    "password": "secret123"
}))]
pub struct LoginRequest {
    /// Account email
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    /// Password
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

/// Successful login response
///
/// Contains the JWT for subsequent requests. Pass it in the
/// `Authorization: Bearer <token>` header.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    /// JWT access token
    pub token: String,
    /// Token type (always `Bearer`)
    pub token_type: String,
    /// Token lifetime in seconds (default 3600 = 1 hour)
    pub expires_in: i64,
    /// The authenticated user
    pub user: UserInfo,
}

/// Sanitized user record: what the API exposes about an account.
/// The password hash never leaves the database layer.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    /// Unique user id (UUID)
    pub id: String,
    /// Username
    pub username: String,
    /// Email
    pub email: String,
    /// Role: `admin`, `doctor`, or `pharmacist`
    pub role: String,
    /// Whether the account must change its temporary password
    pub password_reset_required: bool,
}

impl From<user::Model> for UserInfo {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            role: u.role.as_str().to_string(),
            password_reset_required: u.password_reset_required,
        }
    }
}

/// Registration request (admin only)
///
/// `password` may be omitted for doctor/pharmacist accounts: a temporary
/// password is then generated and delivered by mail, and the account is
/// flagged to change it on first login.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "username": "dr_perera",
    "email": "perera@hospital.example",
    "password": "secure_password_123",
    "role": "doctor"
}))]
pub struct RegisterRequest {
    /// Username (3-50 characters)
    #[validate(length(min = 3, max = 50, message = "username must be 3-50 characters"))]
    pub username: String,
    /// Email address (unique)
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    /// Password (min 8 characters); optional for doctor/pharmacist
    #[validate(length(min = 8, max = 128, message = "password must be 8-128 characters"))]
    pub password: Option<String>,
    /// Role: `admin`, `doctor`, or `pharmacist`
    pub role: String,
}

/// Password change request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "current password is required"))]
    pub current_password: String,
    #[validate(length(min = 8, max = 128, message = "new password must be 8-128 characters"))]
    pub new_password: String,
}

/// Authenticate a user
///
/// Returns a JWT on success. Disabled accounts and wrong passwords both
/// answer 401 without distinguishing which check failed.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Successful login with JWT token", body = ApiResponse<LoginResponse>),
        (status = 401, description = "Invalid credentials or disabled account")
    )
)]
pub async fn login(
    State(state): State<AuthHandlerState>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, (StatusCode, Json<ApiResponse<LoginResponse>>)> {
    let user = user::Entity::find()
        .filter(user::Column::Email.eq(&request.email))
        .one(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    let Some(user) = user else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Invalid credentials")),
        ));
    };

    if !user.is_active {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Account is disabled")),
        ));
    }

    let password_valid = verify_password(&request.password, &user.password_hash).unwrap_or(false);
    if !password_valid {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Invalid credentials")),
        ));
    }

    // Update last login time
    let mut active_user: user::ActiveModel = user.clone().into();
    active_user.last_login_at = Set(Some(Utc::now()));
    active_user.update(&state.db).await.ok();

    let token = create_token(
        &user.id,
        &user.username,
        user.role.as_str(),
        &state.jwt_config,
    )
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    let response = LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_config.expiration_hours * 3600,
        user: user.into(),
    };

    Ok(Json(ApiResponse::success(response)))
}

/// Register a new staff account
///
/// Admin only. Email and username must be unique. The created record is
/// returned sanitized: no credential material is echoed back.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "Authentication",
    security(("bearer_auth" = [])),
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = ApiResponse<UserInfo>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller is not an admin"),
        (status = 409, description = "Email or username already registered"),
        (status = 422, description = "Validation error")
    )
)]
pub async fn register(
    State(state): State<AuthHandlerState>,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserInfo>>), (StatusCode, Json<ApiResponse<UserInfo>>)> {
    let Some(role) = UserRole::parse(&request.role) else {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::error(
                "role must be one of: admin, doctor, pharmacist",
            )),
        ));
    };

    let existing = user::Entity::find()
        .filter(
            user::Column::Email
                .eq(&request.email)
                .or(user::Column::Username.eq(&request.username)),
        )
        .one(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    if existing.is_some() {
        return Err((
            StatusCode::CONFLICT,
            Json(ApiResponse::error("Email or username already registered")),
        ));
    }

    // Doctors and pharmacists may be onboarded without a password: they
    // get a temporary one by mail and must change it on first login.
    let (password, reset_required) = match (request.password, role) {
        (Some(password), _) => (password, false),
        (None, UserRole::Doctor | UserRole::Pharmacist) => {
            let temp_password = generate_temp_password();
            state
                .mailer
                .send_temporary_password(&request.email, &request.username, &temp_password)
                .await
                .map_err(|e| {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(ApiResponse::error(e.to_string())),
                    )
                })?;
            (temp_password, true)
        }
        (None, UserRole::Admin) => {
            return Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ApiResponse::error("password is required for admin accounts")),
            ));
        }
    };

    let password_hash = hash_password(&password).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    let now = Utc::now();
    let new_user = user::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        username: Set(request.username),
        email: Set(request.email),
        password_hash: Set(password_hash),
        role: Set(role),
        password_reset_required: Set(reset_required),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        last_login_at: Set(None),
    };

    let created = new_user.insert(&state.db).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(created.into())),
    ))
}

/// Current user profile
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "Authentication",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user info", body = ApiResponse<UserInfo>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_current_user(
    State(state): State<AuthHandlerState>,
    Extension(caller): Extension<AuthenticatedUser>,
) -> Result<Json<ApiResponse<UserInfo>>, (StatusCode, Json<ApiResponse<UserInfo>>)> {
    let db_user = user::Entity::find_by_id(&caller.user_id)
        .one(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    let Some(db_user) = db_user else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("User not found")),
        ));
    };

    Ok(Json(ApiResponse::success(db_user.into())))
}

/// Change the caller's password
///
/// Verifies the current password, stores the new hash, and clears the
/// temporary-password flag.
#[utoipa::path(
    post,
    path = "/api/v1/auth/change-password",
    tag = "Authentication",
    security(("bearer_auth" = [])),
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 401, description = "Invalid current password"),
        (status = 422, description = "New password too short")
    )
)]
pub async fn change_password(
    State(state): State<AuthHandlerState>,
    Extension(caller): Extension<AuthenticatedUser>,
    ValidatedJson(request): ValidatedJson<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>, (StatusCode, Json<ApiResponse<()>>)> {
    let db_user = user::Entity::find_by_id(&caller.user_id)
        .one(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    let Some(db_user) = db_user else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("User not found")),
        ));
    };

    let password_valid =
        verify_password(&request.current_password, &db_user.password_hash).unwrap_or(false);
    if !password_valid {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Invalid current password")),
        ));
    }

    let new_hash = hash_password(&request.new_password).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    let mut active_user: user::ActiveModel = db_user.into();
    active_user.password_hash = Set(new_hash);
    active_user.password_reset_required = Set(false);
    active_user.updated_at = Set(Utc::now());
    active_user.update(&state.db).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    Ok(Json(ApiResponse::success(())))
}

/// Generate a 12-character alphanumeric temporary password
fn generate_temp_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::LogMailer;
    use crate::auth::jwt::verify_token;
    use crate::infrastructure::database::migrator::Migrator;
    use sea_orm::{Database, DatabaseConnection, PaginatorTrait};
    use sea_orm_migration::MigratorTrait;

    async fn test_state() -> AuthHandlerState {
        let db: DatabaseConnection = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        AuthHandlerState {
            db,
            jwt_config: JwtConfig {
                secret: "test-secret".to_string(),
                expiration_hours: 1,
                issuer: "mediflow".to_string(),
            },
            mailer: Arc::new(LogMailer),
        }
    }

    fn register_request(email: &str, password: Option<&str>, role: &str) -> RegisterRequest {
        RegisterRequest {
            username: format!("user_{}", email.split('@').next().unwrap()),
            email: email.to_string(),
            password: password.map(String::from),
            role: role.to_string(),
        }
    }

    #[tokio::test]
    async fn register_then_login_round_trip() {
        let state = test_state().await;

        let (status, body) = register(
            State(state.clone()),
            ValidatedJson(register_request("a@x.com", Some("secret123"), "doctor")),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        let created = body.0.data.unwrap();
        assert_eq!(created.role, "doctor");

        // Wrong password first
        let err = login(
            State(state.clone()),
            ValidatedJson(LoginRequest {
                email: "a@x.com".to_string(),
                password: "wrong".to_string(),
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);

        // Right password succeeds and the token carries the registered role
        let ok = login(
            State(state.clone()),
            ValidatedJson(LoginRequest {
                email: "a@x.com".to_string(),
                password: "secret123".to_string(),
            }),
        )
        .await
        .unwrap();
        let response = ok.0.data.unwrap();
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 3600);

        let claims = verify_token(&response.token, &state.jwt_config).unwrap();
        assert_eq!(claims.role, "doctor");
        assert_eq!(claims.sub, created.id);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_and_leaves_record_alone() {
        let state = test_state().await;

        register(
            State(state.clone()),
            ValidatedJson(register_request("dup@x.com", Some("firstpass1"), "admin")),
        )
        .await
        .unwrap();

        let mut second = register_request("dup@x.com", Some("otherpass1"), "pharmacist");
        second.username = "different_name".to_string();
        let err = register(State(state.clone()), ValidatedJson(second))
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::CONFLICT);

        // Only one row and the original credentials still work
        let count = user::Entity::find().count(&state.db).await.unwrap();
        assert_eq!(count, 1);
        let ok = login(
            State(state.clone()),
            ValidatedJson(LoginRequest {
                email: "dup@x.com".to_string(),
                password: "firstpass1".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(ok.0.data.unwrap().user.role, "admin");
    }

    #[tokio::test]
    async fn unknown_role_is_rejected() {
        let state = test_state().await;
        let err = register(
            State(state.clone()),
            ValidatedJson(register_request("n@x.com", Some("secret123"), "nurse")),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn omitted_password_flags_reset_for_staff() {
        let state = test_state().await;

        let (_, body) = register(
            State(state.clone()),
            ValidatedJson(register_request("ph@x.com", None, "pharmacist")),
        )
        .await
        .unwrap();
        assert!(body.0.data.unwrap().password_reset_required);

        // Admins must supply one
        let err = register(
            State(state.clone()),
            ValidatedJson(register_request("root@x.com", None, "admin")),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn disabled_account_cannot_login() {
        let state = test_state().await;
        register(
            State(state.clone()),
            ValidatedJson(register_request("off@x.com", Some("secret123"), "doctor")),
        )
        .await
        .unwrap();

        let row = user::Entity::find()
            .filter(user::Column::Email.eq("off@x.com"))
            .one(&state.db)
            .await
            .unwrap()
            .unwrap();
        let mut active: user::ActiveModel = row.into();
        active.is_active = Set(false);
        active.update(&state.db).await.unwrap();

        let err = login(
            State(state.clone()),
            ValidatedJson(LoginRequest {
                email: "off@x.com".to_string(),
                password: "secret123".to_string(),
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn change_password_requires_current_and_clears_flag() {
        let state = test_state().await;
        let (_, body) = register(
            State(state.clone()),
            ValidatedJson(register_request("cp@x.com", None, "doctor")),
        )
        .await
        .unwrap();
        let created = body.0.data.unwrap();

        let caller = AuthenticatedUser {
            user_id: created.id.clone(),
            username: created.username.clone(),
            role: UserRole::Doctor,
        };

        // We don't know the generated temporary password; a wrong guess
        // must be rejected.
        let err = change_password(
            State(state.clone()),
            Extension(caller.clone()),
            ValidatedJson(ChangePasswordRequest {
                current_password: "not-the-temp".to_string(),
                new_password: "brand_new_pw1".to_string(),
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);

        // Swap in a known hash, then the change goes through and clears
        // the reset flag.
        let row = user::Entity::find_by_id(&created.id)
            .one(&state.db)
            .await
            .unwrap()
            .unwrap();
        let mut active: user::ActiveModel = row.into();
        active.password_hash = Set(hash_password("known-temp-1").unwrap());
        active.update(&state.db).await.unwrap();

        change_password(
            State(state.clone()),
            Extension(caller.clone()),
            ValidatedJson(ChangePasswordRequest {
                current_password: "known-temp-1".to_string(),
                new_password: "brand_new_pw1".to_string(),
            }),
        )
        .await
        .unwrap();

        let row = user::Entity::find_by_id(&created.id)
            .one(&state.db)
            .await
            .unwrap()
            .unwrap();
        assert!(!row.password_reset_required);
        assert!(verify_password("brand_new_pw1", &row.password_hash).unwrap());
    }
}
