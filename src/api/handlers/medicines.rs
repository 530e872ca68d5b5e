//! Medicine formulary handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::api::dto::ApiResponse;
use crate::api::extract::ValidatedJson;
use crate::infrastructure::database::entities::medicine::{self, MedicineForm};

/// Medicine handler state
#[derive(Clone)]
pub struct MedicineHandlerState {
    pub db: sea_orm::DatabaseConnection,
}

/// Formulary entry
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MedicineDto {
    pub id: String,
    pub name: String,
    pub generic_name: Option<String>,
    /// e.g. "500mg"
    pub strength: Option<String>,
    /// `tablet` or `capsule`
    pub form: String,
    pub stock_quantity: i32,
    /// Price in the smallest currency unit
    pub unit_price_cents: i64,
    /// ISO 8601 date
    pub expiry_date: Option<String>,
    pub batch_number: Option<String>,
    pub is_active: bool,
}

impl From<medicine::Model> for MedicineDto {
    fn from(m: medicine::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            generic_name: m.generic_name,
            strength: m.strength,
            form: match m.form {
                MedicineForm::Tablet => "tablet".to_string(),
                MedicineForm::Capsule => "capsule".to_string(),
            },
            stock_quantity: m.stock_quantity,
            unit_price_cents: m.unit_price_cents,
            expiry_date: m.expiry_date.map(|d| d.to_string()),
            batch_number: m.batch_number,
            is_active: m.is_active,
        }
    }
}

/// New formulary entry (admin only)
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "name": "Amoxicillin",
    "generic_name": "Amoxicillin trihydrate",
    "strength": "500mg",
    "form": "capsule",
    "stock_quantity": 1200,
    "unit_price_cents": 950
}))]
pub struct CreateMedicineRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 200))]
    pub generic_name: Option<String>,
    #[validate(length(max = 50))]
    pub strength: Option<String>,
    /// `tablet` or `capsule`
    pub form: String,
    #[validate(range(min = 0))]
    pub stock_quantity: Option<i32>,
    #[validate(range(min = 0))]
    pub unit_price_cents: Option<i64>,
    pub expiry_date: Option<NaiveDate>,
    #[validate(length(max = 50))]
    pub batch_number: Option<String>,
}

/// Stock adjustment (pharmacist only)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateStockRequest {
    /// New absolute stock level
    #[validate(range(min = 0))]
    pub stock_quantity: i32,
}

fn parse_form(s: &str) -> Option<MedicineForm> {
    match s.to_lowercase().as_str() {
        "tablet" => Some(MedicineForm::Tablet),
        "capsule" => Some(MedicineForm::Capsule),
        _ => None,
    }
}

/// List the active formulary
///
/// Any authenticated staff member; sorted by name.
#[utoipa::path(
    get,
    path = "/api/v1/medicines",
    tag = "Medicines",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Active medicines", body = ApiResponse<Vec<MedicineDto>>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_medicines(
    State(state): State<MedicineHandlerState>,
) -> Result<Json<ApiResponse<Vec<MedicineDto>>>, (StatusCode, Json<ApiResponse<Vec<MedicineDto>>>)>
{
    let medicines = medicine::Entity::find()
        .filter(medicine::Column::IsActive.eq(true))
        .order_by_asc(medicine::Column::Name)
        .all(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    let items: Vec<MedicineDto> = medicines.into_iter().map(Into::into).collect();
    Ok(Json(ApiResponse::success(items)))
}

/// Get a formulary entry by id
#[utoipa::path(
    get,
    path = "/api/v1/medicines/{id}",
    tag = "Medicines",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Medicine id")),
    responses(
        (status = 200, description = "Medicine record", body = ApiResponse<MedicineDto>),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Medicine not found")
    )
)]
pub async fn get_medicine(
    State(state): State<MedicineHandlerState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MedicineDto>>, (StatusCode, Json<ApiResponse<MedicineDto>>)> {
    let found = medicine::Entity::find_by_id(&id)
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
            Json(ApiResponse::error("Medicine not found")),
        ));
    };

    Ok(Json(ApiResponse::success(found.into())))
}

/// Add a medicine to the formulary
#[utoipa::path(
    post,
    path = "/api/v1/medicines",
    tag = "Medicines",
    security(("bearer_auth" = [])),
    request_body = CreateMedicineRequest,
    responses(
        (status = 201, description = "Medicine created", body = ApiResponse<MedicineDto>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller is not an admin"),
        (status = 422, description = "Validation error")
    )
)]
pub async fn create_medicine(
    State(state): State<MedicineHandlerState>,
    ValidatedJson(request): ValidatedJson<CreateMedicineRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MedicineDto>>), (StatusCode, Json<ApiResponse<MedicineDto>>)>
{
    let Some(form) = parse_form(&request.form) else {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::error("form must be one of: tablet, capsule")),
        ));
    };

    let now = Utc::now();
    let new_medicine = medicine::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        name: Set(request.name),
        generic_name: Set(request.generic_name),
        strength: Set(request.strength),
        form: Set(form),
        stock_quantity: Set(request.stock_quantity.unwrap_or(0)),
        unit_price_cents: Set(request.unit_price_cents.unwrap_or(0)),
        expiry_date: Set(request.expiry_date),
        batch_number: Set(request.batch_number),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let created = new_medicine.insert(&state.db).await.map_err(|e| {
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

/// Set the stock level of a medicine
#[utoipa::path(
    put,
    path = "/api/v1/medicines/{id}/stock",
    tag = "Medicines",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Medicine id")),
    request_body = UpdateStockRequest,
    responses(
        (status = 200, description = "Stock updated", body = ApiResponse<MedicineDto>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller is not a pharmacist"),
        (status = 404, description = "Medicine not found")
    )
)]
pub async fn update_stock(
    State(state): State<MedicineHandlerState>,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdateStockRequest>,
) -> Result<Json<ApiResponse<MedicineDto>>, (StatusCode, Json<ApiResponse<MedicineDto>>)> {
    let found = medicine::Entity::find_by_id(&id)
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
            Json(ApiResponse::error("Medicine not found")),
        ));
    };

    let mut active: medicine::ActiveModel = found.into();
    active.stock_quantity = Set(request.stock_quantity);
    active.updated_at = Set(Utc::now());

    let updated = active.update(&state.db).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    Ok(Json(ApiResponse::success(updated.into())))
}

// ── Tests ──────────────────────────────────────────────────────
