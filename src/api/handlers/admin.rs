//! Admin handlers: user management and dashboard statistics

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use sea_orm::{ColumnTrait, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::auth::UserInfo;
use crate::api::dto::{ApiResponse, PaginatedResponse};
use crate::application::services::DispenserMonitor;
use crate::auth::middleware::AuthenticatedUser;
use crate::infrastructure::database::entities::patient::{self, CardStatus};
use crate::infrastructure::database::entities::prescription::{self, PrescriptionStatus};
use crate::infrastructure::database::entities::user::{self, UserRole};

/// Admin handler state
#[derive(Clone)]
pub struct AdminHandlerState {
    pub db: sea_orm::DatabaseConnection,
    pub monitor: Arc<DispenserMonitor>,
}

/// User list filters
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListUsersParams {
    /// Filter by role: `admin`, `doctor`, `pharmacist`
    pub role: Option<String>,
    /// Page number (1-based). Default 1
    #[serde(default = "default_page")]
    pub page: u64,
    /// Items per page. Default 20
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

fn default_page() -> u64 {
    1
}

fn default_page_size() -> u64 {
    20
}

/// Dashboard counters, gathered in one round trip for the admin landing
/// page.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DashboardStatsDto {
    /// All staff accounts
    pub total_staff: u64,
    pub doctors: u64,
    pub pharmacists: u64,
    pub admins: u64,
    /// Patients holding an active card
    pub active_patients: u64,
    /// Prescriptions waiting at the pharmacy
    pub pending_prescriptions: u64,
    /// Dispenser units currently reporting in
    pub dispensers_online: usize,
    /// Registered dispenser units
    pub dispensers_total: usize,
}

/// List staff accounts
///
/// Sanitized records only; sorted by creation date, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(ListUsersParams),
    responses(
        (status = 200, description = "Paginated user list", body = PaginatedResponse<UserInfo>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn list_users(
    State(state): State<AdminHandlerState>,
    Query(params): Query<ListUsersParams>,
) -> Result<Json<PaginatedResponse<UserInfo>>, (StatusCode, Json<ApiResponse<()>>)> {
    let mut query = user::Entity::find().order_by_desc(user::Column::CreatedAt);

    if let Some(role) = params.role.as_deref().and_then(UserRole::parse) {
        query = query.filter(user::Column::Role.eq(role));
    }

    let total = query.clone().count(&state.db).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    let page = params.page.max(1);
    let page_size = params.page_size.clamp(1, 100);

    let users = query
        .paginate(&state.db, page_size)
        .fetch_page(page - 1)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    let items: Vec<UserInfo> = users.into_iter().map(Into::into).collect();

    Ok(Json(PaginatedResponse::new(
        items,
        total,
        page as u32,
        page_size as u32,
    )))
}

/// Delete a staff account
///
/// Admins cannot delete themselves.
#[utoipa::path(
    delete,
    path = "/api/v1/admin/users/{id}",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 400, description = "Attempted self-deletion"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "User not found")
    )
)]
pub async fn delete_user(
    State(state): State<AdminHandlerState>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, (StatusCode, Json<ApiResponse<()>>)> {
    if caller.user_id == id {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("You can't delete yourself")),
        ));
    }

    let found = user::Entity::find_by_id(&id)
        .one(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    let Some(found) = found else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("User not found")),
        ));
    };

    found.delete(&state.db).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    Ok(Json(ApiResponse::success(())))
}

/// Dashboard statistics
///
/// All counts are queried concurrently.
#[utoipa::path(
    get,
    path = "/api/v1/admin/stats",
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Dashboard counters", body = ApiResponse<DashboardStatsDto>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn dashboard_stats(
    State(state): State<AdminHandlerState>,
) -> Result<Json<ApiResponse<DashboardStatsDto>>, (StatusCode, Json<ApiResponse<DashboardStatsDto>>)>
{
    let db = &state.db;

    let result = tokio::try_join!(
        user::Entity::find().count(db),
        user::Entity::find()
            .filter(user::Column::Role.eq(UserRole::Doctor))
            .count(db),
        user::Entity::find()
            .filter(user::Column::Role.eq(UserRole::Pharmacist))
            .count(db),
        user::Entity::find()
            .filter(user::Column::Role.eq(UserRole::Admin))
            .count(db),
        patient::Entity::find()
            .filter(patient::Column::CardStatus.eq(CardStatus::Active))
            .count(db),
        prescription::Entity::find()
            .filter(prescription::Column::Status.eq(PrescriptionStatus::Pending))
            .count(db),
        state.monitor.fleet_stats(),
    );

    let (total_staff, doctors, pharmacists, admins, active_patients, pending, fleet) = result
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    Ok(Json(ApiResponse::success(DashboardStatsDto {
        total_staff,
        doctors,
        pharmacists,
        admins,
        active_patients,
        pending_prescriptions: pending,
        dispensers_online: fleet.online,
        dispensers_total: fleet.total,
    })))
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password;
    use crate::infrastructure::database::entities::patient::Gender;
    use crate::infrastructure::database::migrator::Migrator;
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
    use sea_orm_migration::MigratorTrait;

    async fn test_state() -> AdminHandlerState {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let monitor = Arc::new(DispenserMonitor::new(db.clone()));
        AdminHandlerState { db, monitor }
    }

    async fn seed_user(db: &DatabaseConnection, username: &str, role: UserRole) -> String {
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        user::ActiveModel {
            id: Set(id.clone()),
            username: Set(username.to_string()),
            email: Set(format!("{}@hospital.example", username)),
            password_hash: Set(hash_password("secret123").unwrap()),
            role: Set(role),
            password_reset_required: Set(false),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            last_login_at: Set(None),
        }
        .insert(db)
        .await
        .unwrap();
        id
    }

    async fn seed_patient(db: &DatabaseConnection, uid: &str, card_status: CardStatus) {
        let now = Utc::now();
        patient::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            first_name: Set("Nimal".to_string()),
            last_name: Set("Perera".to_string()),
            date_of_birth: Set(chrono::NaiveDate::from_ymd_opt(1972, 4, 18).unwrap()),
            nic: Set(None),
            gender: Set(Gender::Male),
            email: Set(None),
            phone: Set("0712345678".to_string()),
            address: Set("12 Lake Road".to_string()),
            city: Set("Kandy".to_string()),
            emergency_contact_name: Set("Kamala Perera".to_string()),
            emergency_contact_phone: Set("0779876543".to_string()),
            blood_type: Set(None),
            allergies: Set(None),
            medical_conditions: Set(None),
            rfid_card_uid: Set(uid.to_string()),
            card_issue_date: Set(now.date_naive()),
            card_status: Set(card_status),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .unwrap();
    }

    fn admin_caller(user_id: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: user_id.to_string(),
            username: "root".to_string(),
            role: UserRole::Admin,
        }
    }

    #[tokio::test]
    async fn stats_count_by_role_and_card_status() {
        let state = test_state().await;
        seed_user(&state.db, "root", UserRole::Admin).await;
        seed_user(&state.db, "dr_a", UserRole::Doctor).await;
        seed_user(&state.db, "dr_b", UserRole::Doctor).await;
        seed_user(&state.db, "ph_a", UserRole::Pharmacist).await;
        seed_patient(&state.db, "C1", CardStatus::Active).await;
        seed_patient(&state.db, "C2", CardStatus::Inactive).await;

        let stats = dashboard_stats(State(state.clone()))
            .await
            .unwrap()
            .0
            .data
            .unwrap();

        assert_eq!(stats.total_staff, 4);
        assert_eq!(stats.doctors, 2);
        assert_eq!(stats.pharmacists, 1);
        assert_eq!(stats.admins, 1);
        assert_eq!(stats.active_patients, 1);
        assert_eq!(stats.pending_prescriptions, 0);
        assert_eq!(stats.dispensers_total, 0);
    }

    #[tokio::test]
    async fn admins_cannot_delete_themselves() {
        let state = test_state().await;
        let root = seed_user(&state.db, "root", UserRole::Admin).await;
        let victim = seed_user(&state.db, "dr_a", UserRole::Doctor).await;

        let err = delete_user(
            State(state.clone()),
            Extension(admin_caller(&root)),
            Path(root.clone()),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        delete_user(
            State(state.clone()),
            Extension(admin_caller(&root)),
            Path(victim.clone()),
        )
        .await
        .unwrap();

        let gone = user::Entity::find_by_id(&victim)
            .one(&state.db)
            .await
            .unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn user_list_filters_by_role() {
        let state = test_state().await;
        seed_user(&state.db, "root", UserRole::Admin).await;
        seed_user(&state.db, "dr_a", UserRole::Doctor).await;

        let doctors = list_users(
            State(state.clone()),
            Query(ListUsersParams {
                role: Some("doctor".to_string()),
                page: 1,
                page_size: 20,
            }),
        )
        .await
        .unwrap();
        assert_eq!(doctors.0.total, 1);
        assert_eq!(doctors.0.items[0].username, "dr_a");
    }
}
