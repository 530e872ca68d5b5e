//! Password reset API handlers
//!
//! Two flows share this module: the reset-required flag check for
//! accounts holding a temporary password, and the forgot/reset flow for
//! anyone locked out. Reset tokens are random, stored hashed, single-use,
//! and expire after one hour.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{Duration, Utc};
use rand::Rng;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::api::dto::ApiResponse;
use crate::api::extract::ValidatedJson;
use crate::application::services::MailNotifier;
use crate::auth::middleware::AuthenticatedUser;
use crate::auth::password::hash_password;
use crate::infrastructure::database::entities::{password_reset_token, user};

/// Reset token lifetime
const RESET_TOKEN_TTL_HOURS: i64 = 1;

/// Password handler state
#[derive(Clone)]
pub struct PasswordHandlerState {
    pub db: sea_orm::DatabaseConnection,
    pub mailer: Arc<dyn MailNotifier>,
}

/// Reset-required flag for the current account
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResetRequiredResponse {
    pub password_reset_required: bool,
}

/// Forgot-password request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
}

/// Token-based reset request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,
    #[validate(length(min = 8, max = 128, message = "new password must be 8-128 characters"))]
    pub new_password: String,
}

/// Check whether the caller must change a temporary password
#[utoipa::path(
    get,
    path = "/api/v1/password/reset-required",
    tag = "Password",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Reset-required flag", body = ApiResponse<ResetRequiredResponse>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn reset_required(
    State(state): State<PasswordHandlerState>,
    Extension(caller): Extension<AuthenticatedUser>,
) -> Result<
    Json<ApiResponse<ResetRequiredResponse>>,
    (StatusCode, Json<ApiResponse<ResetRequiredResponse>>),
> {
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

    Ok(Json(ApiResponse::success(ResetRequiredResponse {
        password_reset_required: db_user.password_reset_required,
    })))
}

/// Request a password reset token
///
/// Always answers generically so the endpoint cannot be used to probe
/// which emails have accounts. When the email exists, a one-hour token
/// is stored (hashed) and delivered by mail.
#[utoipa::path(
    post,
    path = "/api/v1/password/forgot",
    tag = "Password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Generic acknowledgement"),
        (status = 422, description = "Invalid email format")
    )
)]
pub async fn forgot_password(
    State(state): State<PasswordHandlerState>,
    ValidatedJson(request): ValidatedJson<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<String>>, (StatusCode, Json<ApiResponse<String>>)> {
    let found = user::Entity::find()
        .filter(user::Column::Email.eq(&request.email))
        .one(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    if let Some(account) = found {
        let token = generate_reset_token();
        let now = Utc::now();

        let row = password_reset_token::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            user_id: Set(account.id.clone()),
            token_hash: Set(sha256_hex(&token)),
            expires_at: Set(now + Duration::hours(RESET_TOKEN_TTL_HOURS)),
            used_at: Set(None),
            created_at: Set(now),
        };
        row.insert(&state.db).await.map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

        state
            .mailer
            .send_password_reset(&account.email, &token)
            .await
            .map_err(|e| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error(e.to_string())),
                )
            })?;
    }

    Ok(Json(ApiResponse::success(
        "If that email is registered, a reset link has been sent".to_string(),
    )))
}

/// Reset a password with a token
///
/// Consumes the token: a second attempt with the same token fails.
#[utoipa::path(
    post,
    path = "/api/v1/password/reset",
    tag = "Password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset"),
        (status = 401, description = "Invalid, expired, or already used token"),
        (status = 422, description = "Validation error")
    )
)]
pub async fn reset_password(
    State(state): State<PasswordHandlerState>,
    ValidatedJson(request): ValidatedJson<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, (StatusCode, Json<ApiResponse<()>>)> {
    let token_row = password_reset_token::Entity::find()
        .filter(password_reset_token::Column::TokenHash.eq(sha256_hex(&request.token)))
        .one(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    let now = Utc::now();
    let Some(token_row) = token_row else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Invalid or expired reset token")),
        ));
    };
    if !token_row.is_usable(now) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Invalid or expired reset token")),
        ));
    }

    let account = user::Entity::find_by_id(&token_row.user_id)
        .one(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    let Some(account) = account else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("User not found")),
        ));
    };

    let new_hash = hash_password(&request.new_password).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    let mut active_user: user::ActiveModel = account.into();
    active_user.password_hash = Set(new_hash);
    active_user.password_reset_required = Set(false);
    active_user.updated_at = Set(now);
    active_user.update(&state.db).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    let mut active_token: password_reset_token::ActiveModel = token_row.into();
    active_token.used_at = Set(Some(now));
    active_token.update(&state.db).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    Ok(Json(ApiResponse::success(())))
}

/// 32 random bytes, hex encoded
fn generate_reset_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

fn sha256_hex(s: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::MailError;
    use crate::auth::password::verify_password;
    use crate::infrastructure::database::migrator::Migrator;
    use async_trait::async_trait;
    use sea_orm::{Database, DatabaseConnection};
    use sea_orm_migration::MigratorTrait;
    use std::sync::Mutex;

    /// Captures outgoing tokens the way the real mailer would deliver them
    struct CaptureMailer {
        last_reset_token: Mutex<Option<String>>,
    }

    #[async_trait]
    impl MailNotifier for CaptureMailer {
        async fn send_temporary_password(
            &self,
            _email: &str,
            _username: &str,
            _temp_password: &str,
        ) -> Result<(), MailError> {
            Ok(())
        }

        async fn send_password_reset(
            &self,
            _email: &str,
            reset_token: &str,
        ) -> Result<(), MailError> {
            *self.last_reset_token.lock().unwrap() = Some(reset_token.to_string());
            Ok(())
        }
    }

    async fn seed_user(db: &DatabaseConnection, email: &str, password: &str) -> user::Model {
        let now = Utc::now();
        user::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            username: Set("locked_out".to_string()),
            email: Set(email.to_string()),
            password_hash: Set(hash_password(password).unwrap()),
            role: Set(user::UserRole::Doctor),
            password_reset_required: Set(false),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            last_login_at: Set(None),
        }
        .insert(db)
        .await
        .unwrap()
    }

    async fn test_state() -> (PasswordHandlerState, Arc<CaptureMailer>) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let mailer = Arc::new(CaptureMailer {
            last_reset_token: Mutex::new(None),
        });
        (
            PasswordHandlerState {
                db,
                mailer: mailer.clone(),
            },
            mailer,
        )
    }

    #[tokio::test]
    async fn forgot_then_reset_flow() {
        let (state, mailer) = test_state().await;
        let account = seed_user(&state.db, "lost@x.com", "old_password1").await;

        forgot_password(
            State(state.clone()),
            ValidatedJson(ForgotPasswordRequest {
                email: "lost@x.com".to_string(),
            }),
        )
        .await
        .unwrap();

        let token = mailer.last_reset_token.lock().unwrap().clone().unwrap();

        reset_password(
            State(state.clone()),
            ValidatedJson(ResetPasswordRequest {
                token: token.clone(),
                new_password: "new_password1".to_string(),
            }),
        )
        .await
        .unwrap();

        let row = user::Entity::find_by_id(&account.id)
            .one(&state.db)
            .await
            .unwrap()
            .unwrap();
        assert!(verify_password("new_password1", &row.password_hash).unwrap());

        // The token is single-use
        let err = reset_password(
            State(state.clone()),
            ValidatedJson(ResetPasswordRequest {
                token,
                new_password: "another_password1".to_string(),
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_email_answers_generically() {
        let (state, mailer) = test_state().await;

        let ok = forgot_password(
            State(state.clone()),
            ValidatedJson(ForgotPasswordRequest {
                email: "nobody@x.com".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(ok.0.success);
        assert!(mailer.last_reset_token.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let (state, _) = test_state().await;
        let account = seed_user(&state.db, "stale@x.com", "old_password1").await;

        let now = Utc::now();
        let token = generate_reset_token();
        password_reset_token::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            user_id: Set(account.id),
            token_hash: Set(sha256_hex(&token)),
            expires_at: Set(now - Duration::minutes(5)),
            used_at: Set(None),
            created_at: Set(now - Duration::hours(2)),
        }
        .insert(&state.db)
        .await
        .unwrap();

        let err = reset_password(
            State(state),
            ValidatedJson(ResetPasswordRequest {
                token,
                new_password: "new_password1".to_string(),
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }
}
