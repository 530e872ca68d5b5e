//! Prescription workflow handlers
//!
//! Doctors write prescriptions; pharmacists work through the pending
//! queue and mark them dispensed. Listing is scoped by the caller's role.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::api::dto::{ApiResponse, PaginatedResponse, PaginationParams};
use crate::api::extract::ValidatedJson;
use crate::auth::middleware::AuthenticatedUser;
use crate::infrastructure::database::entities::patient;
use crate::infrastructure::database::entities::prescription::{
    self, PrescriptionItem, PrescriptionStatus,
};
use crate::infrastructure::database::entities::user::UserRole;

/// Prescription handler state
#[derive(Clone)]
pub struct PrescriptionHandlerState {
    pub db: sea_orm::DatabaseConnection,
}

/// One prescribed medicine line
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct PrescriptionItemDto {
    /// Medicine id from the formulary
    #[validate(length(min = 1))]
    pub medicine_id: String,
    /// Dose per administration, e.g. "500mg"
    #[validate(length(min = 1, max = 50))]
    pub dosage: String,
    /// e.g. "3x daily", "every 8 hours"
    #[validate(length(min = 1, max = 50))]
    pub frequency: String,
    /// Treatment length in days
    #[validate(range(min = 1, max = 365))]
    pub duration_days: i32,
}

impl From<PrescriptionItemDto> for PrescriptionItem {
    fn from(d: PrescriptionItemDto) -> Self {
        Self {
            medicine_id: d.medicine_id,
            dosage: d.dosage,
            frequency: d.frequency,
            duration_days: d.duration_days,
        }
    }
}

impl From<PrescriptionItem> for PrescriptionItemDto {
    fn from(i: PrescriptionItem) -> Self {
        Self {
            medicine_id: i.medicine_id,
            dosage: i.dosage,
            frequency: i.frequency,
            duration_days: i.duration_days,
        }
    }
}

/// Prescription record
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PrescriptionDto {
    pub id: String,
    pub patient_id: String,
    /// The prescribing doctor's user id
    pub doctor_id: String,
    pub diagnosis: Option<String>,
    pub medicines: Vec<PrescriptionItemDto>,
    /// `pending` or `dispensed`
    pub status: String,
    /// The pharmacist who dispensed it
    pub dispensed_by: Option<String>,
    /// ISO 8601 timestamp
    pub dispensed_at: Option<String>,
    /// ISO 8601 timestamp
    pub created_at: String,
}

impl From<prescription::Model> for PrescriptionDto {
    fn from(p: prescription::Model) -> Self {
        let medicines = p.items().into_iter().map(Into::into).collect();
        Self {
            id: p.id,
            patient_id: p.patient_id,
            doctor_id: p.doctor_id,
            diagnosis: p.diagnosis,
            medicines,
            status: p.status.as_str().to_string(),
            dispensed_by: p.dispensed_by,
            dispensed_at: p.dispensed_at.map(|d| d.to_rfc3339()),
            created_at: p.created_at.to_rfc3339(),
        }
    }
}

/// New prescription request (doctor only)
///
/// The prescribing doctor is taken from the token, never from the body.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePrescriptionRequest {
    #[validate(length(min = 1))]
    pub patient_id: String,
    pub diagnosis: Option<String>,
    /// Must contain at least one line
    #[validate(
        length(min = 1, message = "medicines must be a non-empty list"),
        nested
    )]
    pub medicines: Vec<PrescriptionItemDto>,
}

/// Status update request (pharmacist only)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdatePrescriptionStatusRequest {
    /// Only `dispensed` is accepted; prescriptions never go back to pending
    #[validate(length(min = 1))]
    pub status: String,
}

/// Write a prescription
#[utoipa::path(
    post,
    path = "/api/v1/prescriptions",
    tag = "Prescriptions",
    security(("bearer_auth" = [])),
    request_body = CreatePrescriptionRequest,
    responses(
        (status = 201, description = "Prescription created", body = ApiResponse<PrescriptionDto>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller is not a doctor"),
        (status = 404, description = "Unknown patient"),
        (status = 422, description = "Empty medicine list or invalid line")
    )
)]
pub async fn create_prescription(
    State(state): State<PrescriptionHandlerState>,
    Extension(caller): Extension<AuthenticatedUser>,
    ValidatedJson(request): ValidatedJson<CreatePrescriptionRequest>,
) -> Result<
    (StatusCode, Json<ApiResponse<PrescriptionDto>>),
    (StatusCode, Json<ApiResponse<PrescriptionDto>>),
> {
    if request.medicines.is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::error("medicines must be a non-empty list")),
        ));
    }

    let patient_exists = patient::Entity::find_by_id(&request.patient_id)
        .one(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    if patient_exists.is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Patient not found")),
        ));
    }

    let items: Vec<PrescriptionItem> = request.medicines.into_iter().map(Into::into).collect();
    let medicines_json = serde_json::to_string(&items).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    let now = Utc::now();
    let new_prescription = prescription::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        patient_id: Set(request.patient_id),
        doctor_id: Set(caller.user_id),
        diagnosis: Set(request.diagnosis),
        medicines: Set(medicines_json),
        status: Set(PrescriptionStatus::Pending),
        dispensed_by: Set(None),
        dispensed_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let created = new_prescription.insert(&state.db).await.map_err(|e| {
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

/// List prescriptions, scoped by role
///
/// Doctors see their own (newest first). Pharmacists see the pending
/// queue (oldest first, the order it should be worked). Admins see all.
#[utoipa::path(
    get,
    path = "/api/v1/prescriptions",
    tag = "Prescriptions",
    security(("bearer_auth" = [])),
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated prescription list", body = PaginatedResponse<PrescriptionDto>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_prescriptions(
    State(state): State<PrescriptionHandlerState>,
    Extension(caller): Extension<AuthenticatedUser>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<PrescriptionDto>>, (StatusCode, Json<ApiResponse<()>>)> {
    let query = match caller.role {
        UserRole::Doctor => prescription::Entity::find()
            .filter(prescription::Column::DoctorId.eq(&caller.user_id))
            .order_by_desc(prescription::Column::CreatedAt),
        UserRole::Pharmacist => prescription::Entity::find()
            .filter(prescription::Column::Status.eq(PrescriptionStatus::Pending))
            .order_by_asc(prescription::Column::CreatedAt),
        UserRole::Admin => {
            prescription::Entity::find().order_by_desc(prescription::Column::CreatedAt)
        }
    };

    let total = query.clone().count(&state.db).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    let (page, limit) = params.normalized();
    let rows = query
        .paginate(&state.db, limit)
        .fetch_page(page - 1)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    let items: Vec<PrescriptionDto> = rows.into_iter().map(Into::into).collect();

    Ok(Json(PaginatedResponse::new(
        items,
        total,
        page as u32,
        limit as u32,
    )))
}

/// Get a prescription by id
///
/// Doctors can only read their own; pharmacists and admins any.
#[utoipa::path(
    get,
    path = "/api/v1/prescriptions/{id}",
    tag = "Prescriptions",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Prescription id")),
    responses(
        (status = 200, description = "Prescription record", body = ApiResponse<PrescriptionDto>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Another doctor's prescription"),
        (status = 404, description = "Prescription not found")
    )
)]
pub async fn get_prescription(
    State(state): State<PrescriptionHandlerState>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<PrescriptionDto>>, (StatusCode, Json<ApiResponse<PrescriptionDto>>)> {
    let found = prescription::Entity::find_by_id(&id)
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
            Json(ApiResponse::error("Prescription not found")),
        ));
    };

    match caller.role {
        UserRole::Admin | UserRole::Pharmacist => {}
        UserRole::Doctor => {
            if found.doctor_id != caller.user_id {
                return Err((
                    StatusCode::FORBIDDEN,
                    Json(ApiResponse::error("Insufficient permissions")),
                ));
            }
        }
    }

    Ok(Json(ApiResponse::success(found.into())))
}

/// Mark a prescription dispensed
///
/// The only legal transition is `pending` -> `dispensed`.
#[utoipa::path(
    patch,
    path = "/api/v1/prescriptions/{id}/status",
    tag = "Prescriptions",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Prescription id")),
    request_body = UpdatePrescriptionStatusRequest,
    responses(
        (status = 200, description = "Prescription updated", body = ApiResponse<PrescriptionDto>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller is not a pharmacist"),
        (status = 404, description = "Prescription not found"),
        (status = 409, description = "Already dispensed"),
        (status = 422, description = "Unsupported status value")
    )
)]
pub async fn update_prescription_status(
    State(state): State<PrescriptionHandlerState>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdatePrescriptionStatusRequest>,
) -> Result<Json<ApiResponse<PrescriptionDto>>, (StatusCode, Json<ApiResponse<PrescriptionDto>>)> {
    if request.status != "dispensed" {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::error("status must be \"dispensed\"")),
        ));
    }

    let found = prescription::Entity::find_by_id(&id)
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
            Json(ApiResponse::error("Prescription not found")),
        ));
    };

    match found.status {
        PrescriptionStatus::Pending => {}
        PrescriptionStatus::Dispensed => {
            return Err((
                StatusCode::CONFLICT,
                Json(ApiResponse::error("Prescription already dispensed")),
            ));
        }
    }

    let now = Utc::now();
    let mut active: prescription::ActiveModel = found.into();
    active.status = Set(PrescriptionStatus::Dispensed);
    active.dispensed_by = Set(Some(caller.user_id));
    active.dispensed_at = Set(Some(now));
    active.updated_at = Set(now);

    let updated = active.update(&state.db).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    Ok(Json(ApiResponse::success(updated.into())))
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password;
    use crate::infrastructure::database::entities::patient::{CardStatus, Gender};
    use crate::infrastructure::database::entities::user;
    use crate::infrastructure::database::migrator::Migrator;
    use sea_orm::{Database, DatabaseConnection};
    use sea_orm_migration::MigratorTrait;

    async fn test_state() -> PrescriptionHandlerState {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        PrescriptionHandlerState { db }
    }

    async fn seed_user(db: &DatabaseConnection, username: &str, role: user::UserRole) -> String {
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

    async fn seed_patient(db: &DatabaseConnection, uid: &str) -> String {
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        patient::ActiveModel {
            id: Set(id.clone()),
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
            card_status: Set(CardStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .unwrap();
        id
    }

    fn doctor(user_id: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: user_id.to_string(),
            username: "doc".to_string(),
            role: UserRole::Doctor,
        }
    }

    fn pharmacist(user_id: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: user_id.to_string(),
            username: "pharm".to_string(),
            role: UserRole::Pharmacist,
        }
    }

    fn one_line(patient_id: &str) -> CreatePrescriptionRequest {
        CreatePrescriptionRequest {
            patient_id: patient_id.to_string(),
            diagnosis: Some("tonsillitis".to_string()),
            medicines: vec![PrescriptionItemDto {
                medicine_id: "med-1".to_string(),
                dosage: "500mg".to_string(),
                frequency: "3x daily".to_string(),
                duration_days: 7,
            }],
        }
    }

    #[tokio::test]
    async fn empty_medicine_list_is_rejected() {
        let state = test_state().await;
        let doc_id = seed_user(&state.db, "dr_a", user::UserRole::Doctor).await;
        let patient_id = seed_patient(&state.db, "C1").await;

        let mut request = one_line(&patient_id);
        request.medicines.clear();

        let err = create_prescription(
            State(state.clone()),
            Extension(doctor(&doc_id)),
            ValidatedJson(request),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn listing_is_scoped_by_role() {
        let state = test_state().await;
        let doc_a = seed_user(&state.db, "dr_a", user::UserRole::Doctor).await;
        let doc_b = seed_user(&state.db, "dr_b", user::UserRole::Doctor).await;
        let pharm = seed_user(&state.db, "ph_a", user::UserRole::Pharmacist).await;
        let patient_id = seed_patient(&state.db, "C1").await;

        for _ in 0..2 {
            create_prescription(
                State(state.clone()),
                Extension(doctor(&doc_a)),
                ValidatedJson(one_line(&patient_id)),
            )
            .await
            .unwrap();
        }
        let (_, created_b) = create_prescription(
            State(state.clone()),
            Extension(doctor(&doc_b)),
            ValidatedJson(one_line(&patient_id)),
        )
        .await
        .unwrap();
        let b_id = created_b.0.data.unwrap().id;

        let params = || PaginationParams { page: 1, limit: 50 };

        let seen_by_a = list_prescriptions(
            State(state.clone()),
            Extension(doctor(&doc_a)),
            Query(params()),
        )
        .await
        .unwrap();
        assert_eq!(seen_by_a.0.total, 2);

        // Pharmacist queue holds all three pending
        let queue = list_prescriptions(
            State(state.clone()),
            Extension(pharmacist(&pharm)),
            Query(params()),
        )
        .await
        .unwrap();
        assert_eq!(queue.0.total, 3);

        // Dispensing one shrinks the queue but not the doctor's history
        update_prescription_status(
            State(state.clone()),
            Extension(pharmacist(&pharm)),
            Path(b_id.clone()),
            ValidatedJson(UpdatePrescriptionStatusRequest {
                status: "dispensed".to_string(),
            }),
        )
        .await
        .unwrap();

        let queue = list_prescriptions(
            State(state.clone()),
            Extension(pharmacist(&pharm)),
            Query(params()),
        )
        .await
        .unwrap();
        assert_eq!(queue.0.total, 2);

        let seen_by_b = list_prescriptions(
            State(state.clone()),
            Extension(doctor(&doc_b)),
            Query(params()),
        )
        .await
        .unwrap();
        assert_eq!(seen_by_b.0.total, 1);
        assert_eq!(seen_by_b.0.items[0].status, "dispensed");
    }

    #[tokio::test]
    async fn dispensing_twice_conflicts() {
        let state = test_state().await;
        let doc_id = seed_user(&state.db, "dr_a", user::UserRole::Doctor).await;
        let pharm = seed_user(&state.db, "ph_a", user::UserRole::Pharmacist).await;
        let patient_id = seed_patient(&state.db, "C1").await;

        let (_, created) = create_prescription(
            State(state.clone()),
            Extension(doctor(&doc_id)),
            ValidatedJson(one_line(&patient_id)),
        )
        .await
        .unwrap();
        let id = created.0.data.unwrap().id;

        let updated = update_prescription_status(
            State(state.clone()),
            Extension(pharmacist(&pharm)),
            Path(id.clone()),
            ValidatedJson(UpdatePrescriptionStatusRequest {
                status: "dispensed".to_string(),
            }),
        )
        .await
        .unwrap();
        let dto = updated.0.data.unwrap();
        assert_eq!(dto.status, "dispensed");
        assert_eq!(dto.dispensed_by.as_deref(), Some(pharm.as_str()));

        let err = update_prescription_status(
            State(state.clone()),
            Extension(pharmacist(&pharm)),
            Path(id),
            ValidatedJson(UpdatePrescriptionStatusRequest {
                status: "dispensed".to_string(),
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn doctors_cannot_read_other_doctors_prescriptions() {
        let state = test_state().await;
        let doc_a = seed_user(&state.db, "dr_a", user::UserRole::Doctor).await;
        let doc_b = seed_user(&state.db, "dr_b", user::UserRole::Doctor).await;
        let patient_id = seed_patient(&state.db, "C1").await;

        let (_, created) = create_prescription(
            State(state.clone()),
            Extension(doctor(&doc_a)),
            ValidatedJson(one_line(&patient_id)),
        )
        .await
        .unwrap();
        let id = created.0.data.unwrap().id;

        let err = get_prescription(
            State(state.clone()),
            Extension(doctor(&doc_b)),
            Path(id.clone()),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::FORBIDDEN);

        // The prescribing doctor reads it back, items intact
        let ok = get_prescription(State(state.clone()), Extension(doctor(&doc_a)), Path(id))
            .await
            .unwrap();
        let dto = ok.0.data.unwrap();
        assert_eq!(dto.medicines.len(), 1);
        assert_eq!(dto.medicines[0].dosage, "500mg");
    }
}
