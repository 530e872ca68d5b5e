//! Dispenser fleet handlers
//!
//! Admins register units and hand the one-time device key to the
//! hardware team. Pharmacists load medicine slots and watch the fleet.
//! The units themselves authenticate with the device key and push
//! status reports; the background monitor marks silent units offline.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::api::dto::ApiResponse;
use crate::api::extract::ValidatedJson;
use crate::application::services::DispenserMonitor;
use crate::auth::device_key::{generate_device_key, is_device_key_format, verify_device_key};
use crate::infrastructure::database::entities::dispenser::{self, DispenserStatus};
use crate::infrastructure::database::entities::medicine;

/// Dispenser handler state
#[derive(Clone)]
pub struct DispenserHandlerState {
    pub db: sea_orm::DatabaseConnection,
    pub monitor: Arc<DispenserMonitor>,
}

/// Dispenser unit with liveness info
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DispenserDto {
    /// Unit name, e.g. "dispenser-ward3-01"
    pub name: String,
    /// Medicine loaded in the slot
    pub medicine_id: Option<String>,
    /// `online`, `offline`, `dispensing`, `error`, or `maintenance`
    pub status: String,
    pub is_active: bool,
    pub firmware_version: Option<String>,
    /// ISO 8601 timestamp of the last status report
    pub last_report_at: Option<String>,
    /// Seconds since the last report
    pub seconds_since_report: Option<i64>,
    /// Nominally online but silent past the offline threshold
    pub is_stale: bool,
}

fn to_dto(d: dispenser::Model, monitor: &DispenserMonitor) -> DispenserDto {
    let now = Utc::now();
    let is_stale = match d.status {
        DispenserStatus::Online | DispenserStatus::Dispensing => {
            monitor.is_stale(d.last_report_at, now)
        }
        DispenserStatus::Offline | DispenserStatus::Error | DispenserStatus::Maintenance => false,
    };

    DispenserDto {
        name: d.name,
        medicine_id: d.medicine_id,
        status: d.status.as_str().to_string(),
        is_active: d.is_active,
        firmware_version: d.firmware_version,
        seconds_since_report: d.last_report_at.map(|ts| (now - ts).num_seconds()),
        last_report_at: d.last_report_at.map(|ts| ts.to_rfc3339()),
        is_stale,
    }
}

/// Unit registration request (admin only)
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "name": "dispenser-ward3-01"
}))]
pub struct RegisterDispenserRequest {
    /// Unique unit name (3-64 characters)
    #[validate(length(min = 3, max = 64, message = "name must be 3-64 characters"))]
    pub name: String,
    /// Medicine to pre-load in the slot
    pub medicine_id: Option<String>,
}

/// Registration response; `device_key` is shown only here, store it in the
/// unit's firmware configuration.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisteredDispenserResponse {
    pub dispenser: DispenserDto,
    /// The full device key (only shown once!)
    pub device_key: String,
}

/// Slot configuration request (pharmacist only)
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfigureSlotRequest {
    /// Medicine to load; `null` empties the slot
    pub medicine_id: Option<String>,
}

/// Firmware status report
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "status": "online",
    "firmware_version": "2.4.1"
}))]
pub struct StatusReportRequest {
    /// `online`, `offline`, `dispensing`, `error`, or `maintenance`
    #[validate(length(min = 1))]
    pub status: String,
    pub firmware_version: Option<String>,
}

/// Fleet summary
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FleetStatsDto {
    /// Active units in the fleet
    pub total: usize,
    /// Reporting in and healthy
    pub online: usize,
    /// Offline, faulted, or under maintenance
    pub offline: usize,
    /// Silent past the threshold, about to be marked offline
    pub stale: usize,
}

/// Medicines currently loaded in online units
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AvailableMedicinesResponse {
    /// Distinct medicine ids available for auto-dispense
    pub medicine_ids: Vec<String>,
}

/// Register a dispenser unit
///
/// Admin only. The response carries the unit's device key exactly once.
#[utoipa::path(
    post,
    path = "/api/v1/dispensers",
    tag = "Dispensers",
    security(("bearer_auth" = [])),
    request_body = RegisterDispenserRequest,
    responses(
        (status = 201, description = "Unit registered; device key in response", body = ApiResponse<RegisteredDispenserResponse>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "Unknown medicine"),
        (status = 409, description = "Unit name already taken")
    )
)]
pub async fn register_dispenser(
    State(state): State<DispenserHandlerState>,
    ValidatedJson(request): ValidatedJson<RegisterDispenserRequest>,
) -> Result<
    (StatusCode, Json<ApiResponse<RegisteredDispenserResponse>>),
    (StatusCode, Json<ApiResponse<RegisteredDispenserResponse>>),
> {
    let existing = dispenser::Entity::find_by_id(&request.name)
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
            Json(ApiResponse::error("Unit name already taken")),
        ));
    }

    if let Some(medicine_id) = &request.medicine_id {
        let found = medicine::Entity::find_by_id(medicine_id)
            .one(&state.db)
            .await
            .map_err(|e| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error(e.to_string())),
                )
            })?;
        if found.is_none() {
            return Err((
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error("Medicine not found")),
            ));
        }
    }

    let generated = generate_device_key();
    let now = Utc::now();

    let new_unit = dispenser::ActiveModel {
        name: Set(request.name),
        medicine_id: Set(request.medicine_id),
        status: Set(DispenserStatus::Offline),
        is_active: Set(true),
        device_key_hash: Set(generated.key_hash),
        firmware_version: Set(None),
        last_report_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let created = new_unit.insert(&state.db).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    let response = RegisteredDispenserResponse {
        dispenser: to_dto(created, &state.monitor),
        device_key: generated.key,
    };

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(response)),
    ))
}

/// List the dispenser fleet
///
/// Admins and pharmacists. Each unit carries computed staleness.
#[utoipa::path(
    get,
    path = "/api/v1/dispensers",
    tag = "Dispensers",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Fleet listing", body = ApiResponse<Vec<DispenserDto>>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Insufficient role")
    )
)]
pub async fn list_dispensers(
    State(state): State<DispenserHandlerState>,
) -> Result<Json<ApiResponse<Vec<DispenserDto>>>, (StatusCode, Json<ApiResponse<Vec<DispenserDto>>>)>
{
    let units = dispenser::Entity::find()
        .order_by_asc(dispenser::Column::Name)
        .all(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    let items: Vec<DispenserDto> = units
        .into_iter()
        .map(|u| to_dto(u, &state.monitor))
        .collect();

    Ok(Json(ApiResponse::success(items)))
}

/// Fleet statistics
///
/// Summary counts for the monitoring dashboard widget.
#[utoipa::path(
    get,
    path = "/api/v1/dispensers/stats",
    tag = "Dispensers",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Fleet summary", body = ApiResponse<FleetStatsDto>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Insufficient role")
    )
)]
pub async fn fleet_stats(
    State(state): State<DispenserHandlerState>,
) -> Result<Json<ApiResponse<FleetStatsDto>>, (StatusCode, Json<ApiResponse<FleetStatsDto>>)> {
    let stats = state.monitor.fleet_stats().await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    Ok(Json(ApiResponse::success(FleetStatsDto {
        total: stats.total,
        online: stats.online,
        offline: stats.offline,
        stale: stats.stale,
    })))
}

/// Load or clear a unit's medicine slot
#[utoipa::path(
    put,
    path = "/api/v1/dispensers/{name}/slot",
    tag = "Dispensers",
    security(("bearer_auth" = [])),
    params(("name" = String, Path, description = "Unit name")),
    request_body = ConfigureSlotRequest,
    responses(
        (status = 200, description = "Slot updated", body = ApiResponse<DispenserDto>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller is not a pharmacist"),
        (status = 404, description = "Unknown unit or medicine")
    )
)]
pub async fn configure_slot(
    State(state): State<DispenserHandlerState>,
    Path(name): Path<String>,
    Json(request): Json<ConfigureSlotRequest>,
) -> Result<Json<ApiResponse<DispenserDto>>, (StatusCode, Json<ApiResponse<DispenserDto>>)> {
    let unit = dispenser::Entity::find_by_id(&name)
        .one(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    let Some(unit) = unit else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Dispenser not found")),
        ));
    };

    if let Some(medicine_id) = &request.medicine_id {
        let found = medicine::Entity::find_by_id(medicine_id)
            .one(&state.db)
            .await
            .map_err(|e| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error(e.to_string())),
                )
            })?;
        if found.is_none() {
            return Err((
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error("Medicine not found")),
            ));
        }
    }

    let mut active: dispenser::ActiveModel = unit.into();
    active.medicine_id = Set(request.medicine_id);
    active.updated_at = Set(Utc::now());

    let updated = active.update(&state.db).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    Ok(Json(ApiResponse::success(to_dto(updated, &state.monitor))))
}

/// Firmware status report
///
/// Authenticated with the unit's device key in the `X-Device-Key` header.
/// Unknown units and bad keys are indistinguishable (both 401).
#[utoipa::path(
    post,
    path = "/api/v1/dispensers/{name}/report",
    tag = "Dispensers",
    security(("device_key" = [])),
    params(("name" = String, Path, description = "Unit name")),
    request_body = StatusReportRequest,
    responses(
        (status = 200, description = "Report accepted", body = ApiResponse<DispenserDto>),
        (status = 401, description = "Missing or invalid device key"),
        (status = 422, description = "Unknown status value")
    )
)]
pub async fn report_status(
    State(state): State<DispenserHandlerState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<StatusReportRequest>,
) -> Result<Json<ApiResponse<DispenserDto>>, (StatusCode, Json<ApiResponse<DispenserDto>>)> {
    let device_key = headers
        .get("X-Device-Key")
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    if !is_device_key_format(device_key) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Invalid device key")),
        ));
    }

    let Some(status) = DispenserStatus::parse(&request.status) else {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::error(
                "status must be one of: online, offline, dispensing, error, maintenance",
            )),
        ));
    };

    let unit = dispenser::Entity::find()
        .filter(dispenser::Column::Name.eq(&name))
        .filter(dispenser::Column::IsActive.eq(true))
        .one(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    let Some(unit) = unit else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Invalid device key")),
        ));
    };

    if !verify_device_key(device_key, &unit.device_key_hash) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Invalid device key")),
        ));
    }

    let now = Utc::now();
    let mut active: dispenser::ActiveModel = unit.into();
    active.status = Set(status);
    active.last_report_at = Set(Some(now));
    if let Some(fw) = request.firmware_version {
        active.firmware_version = Set(Some(fw));
    }
    active.updated_at = Set(now);

    let updated = active.update(&state.db).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        )
    })?;

    Ok(Json(ApiResponse::success(to_dto(updated, &state.monitor))))
}

/// Medicines available for auto-dispense
///
/// Distinct medicine ids loaded in online, active units. Doctors consult
/// this when prescribing; pharmacists when routing to a dispenser.
#[utoipa::path(
    get,
    path = "/api/v1/dispensers/available-medicines",
    tag = "Dispensers",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Available medicine ids", body = ApiResponse<AvailableMedicinesResponse>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Insufficient role")
    )
)]
pub async fn available_medicines(
    State(state): State<DispenserHandlerState>,
) -> Result<
    Json<ApiResponse<AvailableMedicinesResponse>>,
    (StatusCode, Json<ApiResponse<AvailableMedicinesResponse>>),
> {
    let units = dispenser::Entity::find()
        .filter(dispenser::Column::IsActive.eq(true))
        .filter(dispenser::Column::Status.eq(DispenserStatus::Online))
        .all(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        })?;

    let mut medicine_ids: Vec<String> =
        units.into_iter().filter_map(|u| u.medicine_id).collect();
    medicine_ids.sort();
    medicine_ids.dedup();

    Ok(Json(ApiResponse::success(AvailableMedicinesResponse {
        medicine_ids,
    })))
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::migrator::Migrator;
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    async fn test_state() -> DispenserHandlerState {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let monitor = Arc::new(DispenserMonitor::new(db.clone()));
        DispenserHandlerState { db, monitor }
    }

    async fn register(state: &DispenserHandlerState, name: &str) -> (DispenserDto, String) {
        let (_, body) = register_dispenser(
            State(state.clone()),
            ValidatedJson(RegisterDispenserRequest {
                name: name.to_string(),
                medicine_id: None,
            }),
        )
        .await
        .unwrap();
        let response = body.0.data.unwrap();
        (response.dispenser, response.device_key)
    }

    fn key_header(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-Device-Key", key.parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn duplicate_name_conflicts() {
        let state = test_state().await;
        register(&state, "ward3-01").await;

        let err = register_dispenser(
            State(state.clone()),
            ValidatedJson(RegisterDispenserRequest {
                name: "ward3-01".to_string(),
                medicine_id: None,
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn report_requires_the_issued_key() {
        let state = test_state().await;
        let (_, key) = register(&state, "ward3-01").await;
        let (_, other_key) = register(&state, "ward3-02").await;

        // The right key brings the unit online
        let ok = report_status(
            State(state.clone()),
            Path("ward3-01".to_string()),
            key_header(&key),
            ValidatedJson(StatusReportRequest {
                status: "online".to_string(),
                firmware_version: Some("2.4.1".to_string()),
            }),
        )
        .await
        .unwrap();
        let dto = ok.0.data.unwrap();
        assert_eq!(dto.status, "online");
        assert_eq!(dto.firmware_version.as_deref(), Some("2.4.1"));
        assert!(dto.last_report_at.is_some());

        // Another unit's key is refused
        let err = report_status(
            State(state.clone()),
            Path("ward3-01".to_string()),
            key_header(&other_key),
            ValidatedJson(StatusReportRequest {
                status: "online".to_string(),
                firmware_version: None,
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);

        // Garbage is refused before touching the database
        let err = report_status(
            State(state.clone()),
            Path("ward3-01".to_string()),
            key_header("not-a-key"),
            ValidatedJson(StatusReportRequest {
                status: "online".to_string(),
                firmware_version: None,
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_status_is_rejected() {
        let state = test_state().await;
        let (_, key) = register(&state, "ward3-01").await;

        let err = report_status(
            State(state.clone()),
            Path("ward3-01".to_string()),
            key_header(&key),
            ValidatedJson(StatusReportRequest {
                status: "exploded".to_string(),
                firmware_version: None,
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::UNPROCESSABLE_ENTITY);
    }

    async fn seed_medicine(state: &DispenserHandlerState, id: &str) {
        let now = Utc::now();
        medicine::ActiveModel {
            id: Set(id.to_string()),
            name: Set(id.to_string()),
            generic_name: Set(None),
            strength: Set(None),
            form: Set(crate::infrastructure::database::entities::medicine::MedicineForm::Tablet),
            stock_quantity: Set(100),
            unit_price_cents: Set(0),
            expiry_date: Set(None),
            batch_number: Set(None),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&state.db)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn available_medicines_lists_online_slots_only() {
        let state = test_state().await;
        seed_medicine(&state, "med-amox").await;
        seed_medicine(&state, "med-para").await;

        // Two online units with the same medicine, one offline with another
        let now = Utc::now();
        for (name, medicine, status) in [
            ("u1", Some("med-amox"), DispenserStatus::Online),
            ("u2", Some("med-amox"), DispenserStatus::Online),
            ("u3", Some("med-para"), DispenserStatus::Offline),
            ("u4", None, DispenserStatus::Online),
        ] {
            dispenser::ActiveModel {
                name: Set(name.to_string()),
                medicine_id: Set(medicine.map(String::from)),
                status: Set(status),
                is_active: Set(true),
                device_key_hash: Set("hash".to_string()),
                firmware_version: Set(None),
                last_report_at: Set(Some(now)),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&state.db)
            .await
            .unwrap();
        }

        let ok = available_medicines(State(state.clone())).await.unwrap();
        let response = ok.0.data.unwrap();
        assert_eq!(response.medicine_ids, vec!["med-amox".to_string()]);
    }

    #[tokio::test]
    async fn slot_can_be_cleared() {
        let state = test_state().await;
        register(&state, "ward3-01").await;

        // No such medicine
        let err = configure_slot(
            State(state.clone()),
            Path("ward3-01".to_string()),
            Json(ConfigureSlotRequest {
                medicine_id: Some("missing".to_string()),
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::NOT_FOUND);

        // Clearing always works
        let ok = configure_slot(
            State(state.clone()),
            Path("ward3-01".to_string()),
            Json(ConfigureSlotRequest { medicine_id: None }),
        )
        .await
        .unwrap();
        assert!(ok.0.data.unwrap().medicine_id.is_none());
    }
}
