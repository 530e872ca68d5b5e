//! Patient record handlers
//!
//! Patients are registered by admins together with their RFID card.
//! Clinical staff resolve a scanned card UID to the record through
//! the by-card lookup.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::api::dto::{ApiResponse, PaginatedResponse};
use crate::api::extract::ValidatedJson;
use crate::infrastructure::database::entities::patient::{self, CardStatus, Gender};

/// Patient handler state
#[derive(Clone)]
pub struct PatientHandlerState {
    pub db: sea_orm::DatabaseConnection,
}

/// Patient record
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PatientDto {
    /// Unique patient id (UUID)
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    /// ISO 8601 date
    pub date_of_birth: String,
    /// National identity card number
    pub nic: Option<String>,
    /// `male`, `female`, or `other`
    pub gender: String,
    pub email: Option<String>,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub emergency_contact_name: String,
    pub emergency_contact_phone: String,
    pub blood_type: Option<String>,
    pub allergies: Option<String>,
    pub medical_conditions: Option<String>,
    /// UID of the patient's RFID card (unique)
    pub rfid_card_uid: String,
    /// ISO 8601 date the card was issued
    pub card_issue_date: String,
    /// `active`, `inactive`, or `pending`
    pub card_status: String,
    /// ISO 8601 timestamp
    pub created_at: String,
}

impl From<patient::Model> for PatientDto {
    fn from(p: patient::Model) -> Self {
        Self {
            id: p.id,
            first_name: p.first_name,
            last_name: p.last_name,
            date_of_birth: p.date_of_birth.to_string(),
            nic: p.nic,
            gender: match p.gender {
                Gender::Male => "male".to_string(),
                Gender::Female => "female".to_string(),
                Gender::Other => "other".to_string(),
            },
            email: p.email,
            phone: p.phone,
            address: p.address,
            city: p.city,
            emergency_contact_name: p.emergency_contact_name,
            emergency_contact_phone: p.emergency_contact_phone,
            blood_type: p.blood_type,
            allergies: p.allergies,
            medical_conditions: p.medical_conditions,
            rfid_card_uid: p.rfid_card_uid,
            card_issue_date: p.card_issue_date.to_string(),
            card_status: p.card_status.as_str().to_string(),
            created_at: p.created_at.to_rfc3339(),
        }
    }
}

/// Patient registration request (admin only)
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "first_name": "Nimal",
    "last_name": "Perera",
    "date_of_birth": "1972-04-18",
    "gender": "male",
    "phone": "0712345678",
    "address": "12 Lake Road",
    "city": "Kandy",
    "emergency_contact_name": "Kamala Perera",
    "emergency_contact_phone": "0779876543",
    "rfid_card_uid": "04A224E2C55E80"
}))]
pub struct CreatePatientRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub nic: Option<String>,
    /// `male`, `female`, or `other`
    pub gender: String,
    #[validate(email(message = "invalid email format"))]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub phone: String,
    #[validate(length(min = 1))]
    pub address: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 200))]
    pub emergency_contact_name: String,
    #[validate(length(min = 1, max = 20))]
    pub emergency_contact_phone: String,
    pub blood_type: Option<String>,
    pub allergies: Option<String>,
    pub medical_conditions: Option<String>,
    /// Card UID as read from the RFID scanner; must be unused
    #[validate(length(min = 4, max = 64))]
    pub rfid_card_uid: String,
    /// Defaults to today
    pub card_issue_date: Option<NaiveDate>,
    /// `active`, `inactive`, or `pending`. Defaults to `active`
    pub card_status: Option<String>,
}

/// Patient list filters
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListPatientsParams {
    /// Filter by card status: `active`, `inactive`, `pending`
    pub card_status: Option<String>,
    /// Filter by city
    pub city: Option<String>,
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

fn parse_gender(s: &str) -> Option<Gender> {
    match s.to_lowercase().as_str() {
        "male" => Some(Gender::Male),
        "female" => Some(Gender::Female),
        "other" => Some(Gender::Other),
        _ => None,
    }
}

fn parse_card_status(s: &str) -> Option<CardStatus> {
    match s.to_lowercase().as_str() {
        "active" => Some(CardStatus::Active),
        "inactive" => Some(CardStatus::Inactive),
        "pending" => Some(CardStatus::Pending),
        _ => None,
    }
}

/// Register a new patient
///
/// Admin only. The RFID card UID must not already be assigned.
#[utoipa::path(
    post,
    path = "/api/v1/patients",
    tag = "Patients",
    security(("bearer_auth" = [])),
    request_body = CreatePatientRequest,
    responses(
        (status = 201, description = "Patient registered", body = ApiResponse<PatientDto>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller is not an admin"),
        (status = 409, description = "RFID card already registered to another patient"),
        (status = 422, description = "Validation error")
    )
)]
pub async fn create_patient(
    State(state): State<PatientHandlerState>,
    ValidatedJson(request): ValidatedJson<CreatePatientRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PatientDto>>), (StatusCode, Json<ApiResponse<PatientDto>>)>
{
    let Some(gender) = parse_gender(&request.gender) else {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::error("gender must be one of: male, female, other")),
        ));
    };

    let card_status = match &request.card_status {
        Some(s) => match parse_card_status(s) {
            Some(status) => status,
            None => {
                return Err((
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(ApiResponse::error(
                        "card_status must be one of: active, inactive, pending",
                    )),
                ));
            }
        },
        None => CardStatus::Active,
    };

    let existing_card = patient::Entity::find()
        .filter(patient::Column::RfidCardUid.eq(&request.rfid_card_uid))
        .one(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    if existing_card.is_some() {
        return Err((
            StatusCode::CONFLICT,
            Json(ApiResponse::error(
                "This RFID card is already registered to another patient",
            )),
        ));
    }

    let now = Utc::now();
    let new_patient = patient::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        first_name: Set(request.first_name),
        last_name: Set(request.last_name),
        date_of_birth: Set(request.date_of_birth),
        nic: Set(request.nic),
        gender: Set(gender),
        email: Set(request.email),
        phone: Set(request.phone),
        address: Set(request.address),
        city: Set(request.city),
        emergency_contact_name: Set(request.emergency_contact_name),
        emergency_contact_phone: Set(request.emergency_contact_phone),
        blood_type: Set(request.blood_type),
        allergies: Set(request.allergies),
        medical_conditions: Set(request.medical_conditions),
        rfid_card_uid: Set(request.rfid_card_uid),
        card_issue_date: Set(request.card_issue_date.unwrap_or_else(|| now.date_naive())),
        card_status: Set(card_status),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let created = new_patient.insert(&state.db).await.map_err(|e| {
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

/// List patients
///
/// Admins and doctors. Sorted by registration date, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/patients",
    tag = "Patients",
    security(("bearer_auth" = [])),
    params(ListPatientsParams),
    responses(
        (status = 200, description = "Paginated patient list", body = PaginatedResponse<PatientDto>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Insufficient role")
    )
)]
pub async fn list_patients(
    State(state): State<PatientHandlerState>,
    Query(params): Query<ListPatientsParams>,
) -> Result<Json<PaginatedResponse<PatientDto>>, (StatusCode, Json<ApiResponse<()>>)> {
    let mut query = patient::Entity::find().order_by_desc(patient::Column::CreatedAt);

    if let Some(status) = params.card_status.as_deref().and_then(parse_card_status) {
        query = query.filter(patient::Column::CardStatus.eq(status));
    }

    if let Some(city) = &params.city {
        query = query.filter(patient::Column::City.eq(city));
    }

    let total = query.clone().count(&state.db).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    let page = params.page.max(1);
    let page_size = params.page_size.clamp(1, 100);

    let patients = query
        .paginate(&state.db, page_size)
        .fetch_page(page - 1)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    let items: Vec<PatientDto> = patients.into_iter().map(Into::into).collect();

    Ok(Json(PaginatedResponse::new(
        items,
        total,
        page as u32,
        page_size as u32,
    )))
}

/// Get a patient by id
#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}",
    tag = "Patients",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient record", body = ApiResponse<PatientDto>),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Patient not found")
    )
)]
pub async fn get_patient(
    State(state): State<PatientHandlerState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<PatientDto>>, (StatusCode, Json<ApiResponse<PatientDto>>)> {
    let found = patient::Entity::find_by_id(&id)
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
            Json(ApiResponse::error("Patient not found")),
        ));
    };

    Ok(Json(ApiResponse::success(found.into())))
}

/// Look up a patient by scanned RFID card
///
/// The bedside / counter scan path: resolves a card UID to the patient
/// record. Cards that are pending or withdrawn resolve but are refused.
#[utoipa::path(
    get,
    path = "/api/v1/patients/by-card/{uid}",
    tag = "Patients",
    security(("bearer_auth" = [])),
    params(("uid" = String, Path, description = "RFID card UID")),
    responses(
        (status = 200, description = "Patient record for the card", body = ApiResponse<PatientDto>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Card is not active"),
        (status = 404, description = "Unknown card")
    )
)]
pub async fn get_patient_by_card(
    State(state): State<PatientHandlerState>,
    Path(uid): Path<String>,
) -> Result<Json<ApiResponse<PatientDto>>, (StatusCode, Json<ApiResponse<PatientDto>>)> {
    let found = patient::Entity::find()
        .filter(patient::Column::RfidCardUid.eq(&uid))
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
            Json(ApiResponse::error("Unknown card")),
        ));
    };

    match found.card_status {
        CardStatus::Active => Ok(Json(ApiResponse::success(found.into()))),
        CardStatus::Inactive | CardStatus::Pending => Err((
            StatusCode::FORBIDDEN,
            Json(ApiResponse::error("Card is not active")),
        )),
    }
}

// ── Tests ──────────────────────────────────────────────────────
