//! API Router with Swagger UI

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sea_orm::DatabaseConnection;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::dto::{ApiResponse, PaginatedResponse, PaginationParams};
use crate::api::handlers::{
    admin, auth, dispensers, health, medicines, metrics, password, patients, prescriptions,
};
use crate::application::services::{DispenserMonitor, MailNotifier};
use crate::auth::jwt::JwtConfig;
use crate::auth::middleware::{
    auth_middleware, require_admin, require_clinical_staff, require_doctor, require_fleet_access,
    require_pharmacist, require_records_access, AuthState,
};
use crate::config::AppConfig;

/// Security scheme modifier for OpenAPI
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("JWT Bearer token"))
                        .build(),
                ),
            );
            components.add_security_scheme(
                "device_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-Device-Key"))),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health_check,
        // Auth
        auth::login,
        auth::register,
        auth::get_current_user,
        auth::change_password,
        // Password
        password::reset_required,
        password::forgot_password,
        password::reset_password,
        // Admin
        admin::list_users,
        admin::delete_user,
        admin::dashboard_stats,
        // Patients
        patients::create_patient,
        patients::list_patients,
        patients::get_patient,
        patients::get_patient_by_card,
        // Prescriptions
        prescriptions::create_prescription,
        prescriptions::list_prescriptions,
        prescriptions::get_prescription,
        prescriptions::update_prescription_status,
        // Medicines
        medicines::list_medicines,
        medicines::get_medicine,
        medicines::create_medicine,
        medicines::update_stock,
        // Dispensers
        dispensers::register_dispenser,
        dispensers::list_dispensers,
        dispensers::fleet_stats,
        dispensers::configure_slot,
        dispensers::report_status,
        dispensers::available_medicines,
    ),
    components(
        schemas(
            // Common
            ApiResponse<String>,
            PaginatedResponse<auth::UserInfo>,
            PaginatedResponse<patients::PatientDto>,
            PaginatedResponse<prescriptions::PrescriptionDto>,
            PaginationParams,
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            auth::RegisterRequest,
            auth::UserInfo,
            auth::ChangePasswordRequest,
            // Password
            password::ResetRequiredResponse,
            password::ForgotPasswordRequest,
            password::ResetPasswordRequest,
            // Admin
            admin::DashboardStatsDto,
            // Patients
            patients::PatientDto,
            patients::CreatePatientRequest,
            // Prescriptions
            prescriptions::PrescriptionDto,
            prescriptions::PrescriptionItemDto,
            prescriptions::CreatePrescriptionRequest,
            prescriptions::UpdatePrescriptionStatusRequest,
            // Medicines
            medicines::MedicineDto,
            medicines::CreateMedicineRequest,
            medicines::UpdateStockRequest,
            // Dispensers
            dispensers::DispenserDto,
            dispensers::RegisterDispenserRequest,
            dispensers::RegisteredDispenserResponse,
            dispensers::ConfigureSlotRequest,
            dispensers::StatusReportRequest,
            dispensers::FleetStatsDto,
            dispensers::AvailableMedicinesResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Service health check for uptime monitoring. No authorization required."),
        (name = "Authentication", description = "User authentication: login (JWT), staff registration, password change. The token is returned in the `token` field and passed in the `Authorization: Bearer <token>` header. Tokens expire after one hour; there is no refresh - log in again."),
        (name = "Password", description = "Password recovery: reset-required flag for temporary passwords, and the forgot/reset token flow. Reset tokens are single-use and valid for one hour."),
        (name = "Admin", description = "Staff account management and dashboard statistics. Admin role required."),
        (name = "Patients", description = "Patient records with RFID card binding. Registration is admin-only; clinical staff resolve scanned card UIDs through the by-card lookup. Card statuses: `active`, `inactive`, `pending`."),
        (name = "Prescriptions", description = "Prescription workflow. Doctors write prescriptions (the prescriber is always taken from the token); pharmacists work the pending queue and mark them dispensed. The only legal status transition is `pending` -> `dispensed`."),
        (name = "Medicines", description = "The medicine formulary. Listing is open to all staff; new entries are admin-only; stock levels are maintained by pharmacists. Prices are stored in the smallest currency unit."),
        (name = "Dispensers", description = "IoT dispenser fleet. Units are registered by an admin (the device key is shown once), loaded by pharmacists, and report their own status with the `X-Device-Key` header. Statuses: `online`, `offline`, `dispensing`, `error`, `maintenance`. Units silent past the threshold are marked offline by the background monitor."),
    ),
    info(
        title = "MediFlow Service API",
        version = "1.0.0",
        description = "REST API for hospital/pharmacy administration: role-gated staff accounts \
(admin, doctor, pharmacist), patient records with RFID card lookup, the prescription \
workflow, the medicine formulary, and medicine dispenser fleet monitoring.

## Authentication

Obtain a JWT via `POST /api/v1/auth/login` and pass it as `Authorization: Bearer <token>`. \
Tokens carry the account role and expire after one hour. Dispenser firmware authenticates \
its status reports with the `X-Device-Key` header instead.

## Response format

All REST responses use a standard envelope:
```json
{\"success\": true, \"data\": {...}, \"error\": null}
```

On failure:
```json
{\"success\": false, \"data\": null, \"error\": \"description\"}
```

## Pagination

List endpoints accept `page` (from 1) and `page_size`/`limit` parameters.",
        license(
            name = "MIT"
        )
    )
)]
pub struct ApiDoc;

/// Create the API router with all routes
pub fn create_api_router(
    db: DatabaseConnection,
    jwt_config: JwtConfig,
    monitor: Arc<DispenserMonitor>,
    mailer: Arc<dyn MailNotifier>,
    prometheus_handle: PrometheusHandle,
    app_cfg: &AppConfig,
) -> Router {
    health::mark_started();

    let auth_state = AuthState {
        jwt_config: jwt_config.clone(),
    };

    // Rate limiter for the public auth surface (per client IP)
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(app_cfg.rate_limit.auth_per_second)
            .burst_size(app_cfg.rate_limit.auth_burst)
            .finish()
            .expect("invalid rate limit configuration"),
    );

    // ── Auth ───────────────────────────────────────────────────
    let auth_handler_state = auth::AuthHandlerState {
        db: db.clone(),
        jwt_config: jwt_config.clone(),
        mailer: mailer.clone(),
    };

    let auth_public = Router::new()
        .route("/login", post(auth::login))
        .layer(GovernorLayer {
            config: governor_conf.clone(),
        })
        .with_state(auth_handler_state.clone());

    let auth_protected = Router::new()
        .merge(
            Router::new()
                .route("/register", post(auth::register))
                .route_layer(middleware::from_fn(require_admin)),
        )
        .route("/me", get(auth::get_current_user))
        .route("/change-password", post(auth::change_password))
        .layer(middleware::from_fn_with_state(
            auth_state.clone(),
            auth_middleware,
        ))
        .with_state(auth_handler_state);

    // ── Password ───────────────────────────────────────────────
    let password_state = password::PasswordHandlerState {
        db: db.clone(),
        mailer,
    };

    let password_public = Router::new()
        .route("/forgot", post(password::forgot_password))
        .route("/reset", post(password::reset_password))
        .layer(GovernorLayer {
            config: governor_conf,
        })
        .with_state(password_state.clone());

    let password_protected = Router::new()
        .route("/reset-required", get(password::reset_required))
        .layer(middleware::from_fn_with_state(
            auth_state.clone(),
            auth_middleware,
        ))
        .with_state(password_state);

    // ── Admin ──────────────────────────────────────────────────
    let admin_state = admin::AdminHandlerState {
        db: db.clone(),
        monitor: monitor.clone(),
    };

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route("/users/{id}", delete(admin::delete_user))
        .route("/stats", get(admin::dashboard_stats))
        .route_layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(
            auth_state.clone(),
            auth_middleware,
        ))
        .with_state(admin_state);

    // ── Patients ───────────────────────────────────────────────
    let patient_state = patients::PatientHandlerState { db: db.clone() };

    let patient_routes = Router::new()
        .merge(
            Router::new()
                .route("/", post(patients::create_patient))
                .route_layer(middleware::from_fn(require_admin)),
        )
        .merge(
            Router::new()
                .route("/", get(patients::list_patients))
                .route_layer(middleware::from_fn(require_records_access)),
        )
        .merge(
            Router::new()
                .route("/by-card/{uid}", get(patients::get_patient_by_card))
                .route_layer(middleware::from_fn(require_clinical_staff)),
        )
        .route("/{id}", get(patients::get_patient))
        .layer(middleware::from_fn_with_state(
            auth_state.clone(),
            auth_middleware,
        ))
        .with_state(patient_state);

    // ── Prescriptions ──────────────────────────────────────────
    let prescription_state = prescriptions::PrescriptionHandlerState { db: db.clone() };

    let prescription_routes = Router::new()
        .merge(
            Router::new()
                .route("/", post(prescriptions::create_prescription))
                .route_layer(middleware::from_fn(require_doctor)),
        )
        .merge(
            Router::new()
                .route("/{id}/status", patch(prescriptions::update_prescription_status))
                .route_layer(middleware::from_fn(require_pharmacist)),
        )
        .route("/", get(prescriptions::list_prescriptions))
        .route("/{id}", get(prescriptions::get_prescription))
        .layer(middleware::from_fn_with_state(
            auth_state.clone(),
            auth_middleware,
        ))
        .with_state(prescription_state);

    // ── Medicines ──────────────────────────────────────────────
    let medicine_state = medicines::MedicineHandlerState { db: db.clone() };

    let medicine_routes = Router::new()
        .merge(
            Router::new()
                .route("/", post(medicines::create_medicine))
                .route_layer(middleware::from_fn(require_admin)),
        )
        .merge(
            Router::new()
                .route("/{id}/stock", put(medicines::update_stock))
                .route_layer(middleware::from_fn(require_pharmacist)),
        )
        .route("/", get(medicines::list_medicines))
        .route("/{id}", get(medicines::get_medicine))
        .layer(middleware::from_fn_with_state(
            auth_state.clone(),
            auth_middleware,
        ))
        .with_state(medicine_state);

    // ── Dispensers ─────────────────────────────────────────────
    let dispenser_state = dispensers::DispenserHandlerState {
        db: db.clone(),
        monitor,
    };

    let dispenser_staff_routes = Router::new()
        .merge(
            Router::new()
                .route("/", post(dispensers::register_dispenser))
                .route_layer(middleware::from_fn(require_admin)),
        )
        .merge(
            Router::new()
                .route("/", get(dispensers::list_dispensers))
                .route("/stats", get(dispensers::fleet_stats))
                .route_layer(middleware::from_fn(require_fleet_access)),
        )
        .merge(
            Router::new()
                .route(
                    "/available-medicines",
                    get(dispensers::available_medicines),
                )
                .route_layer(middleware::from_fn(require_clinical_staff)),
        )
        .merge(
            Router::new()
                .route("/{name}/slot", put(dispensers::configure_slot))
                .route_layer(middleware::from_fn(require_pharmacist)),
        )
        .layer(middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ));

    // Device reports authenticate with the device key inside the handler
    let dispenser_device_routes =
        Router::new().route("/{name}/report", post(dispensers::report_status));

    let dispenser_routes = dispenser_staff_routes
        .merge(dispenser_device_routes)
        .with_state(dispenser_state);

    // ── Metrics ────────────────────────────────────────────────
    let metrics_state = metrics::MetricsState {
        handle: prometheus_handle,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let swagger_routes = SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi());

    // Build router
    Router::new()
        // Swagger UI
        .merge(swagger_routes)
        // Health & metrics
        .route("/health", get(health::health_check))
        .route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(metrics_state),
        )
        // Auth
        .nest("/api/v1/auth", auth_public)
        .nest("/api/v1/auth", auth_protected)
        // Password
        .nest("/api/v1/password", password_public)
        .nest("/api/v1/password", password_protected)
        // Admin
        .nest("/api/v1/admin", admin_routes)
        // Patients
        .nest("/api/v1/patients", patient_routes)
        // Prescriptions
        .nest("/api/v1/prescriptions", prescription_routes)
        // Medicines
        .nest("/api/v1/medicines", medicine_routes)
        // Dispensers
        .nest("/api/v1/dispensers", dispenser_routes)
        // Middleware
        .layer(middleware::from_fn(metrics::http_metrics_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::LogMailer;
    use crate::auth::jwt::create_token;
    use crate::auth::password::hash_password;
    use crate::infrastructure::database::entities::user::{self, UserRole};
    use crate::infrastructure::database::migrator::Migrator;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, Database, Set};
    use sea_orm_migration::MigratorTrait;
    use tower::Service;

    async fn test_app() -> (Router, JwtConfig, DatabaseConnection) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();

        let jwt_config = JwtConfig {
            secret: "test-secret".to_string(),
            expiration_hours: 1,
            issuer: "mediflow".to_string(),
        };
        let monitor = Arc::new(DispenserMonitor::new(db.clone()));
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();

        let app = create_api_router(
            db.clone(),
            jwt_config.clone(),
            monitor,
            Arc::new(LogMailer),
            handle,
            &AppConfig::default(),
        );

        (app, jwt_config, db)
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

    fn register_body() -> Body {
        Body::from(
            serde_json::json!({
                "username": "new_doctor",
                "email": "new@hospital.example",
                "password": "secret123",
                "role": "doctor"
            })
            .to_string(),
        )
    }

    async fn send(app: &mut Router, req: Request<Body>) -> axum::http::Response<Body> {
        app.call(req).await.unwrap()
    }

    #[tokio::test]
    async fn health_is_open() {
        let (mut app, _, _) = test_app().await;
        let resp = send(
            &mut app,
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn register_is_gated_by_role() {
        let (mut app, jwt_config, db) = test_app().await;
        let admin_id = seed_user(&db, "root", UserRole::Admin).await;
        let doctor_id = seed_user(&db, "dr_a", UserRole::Doctor).await;

        // No token
        let resp = send(
            &mut app,
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/register")
                .header("content-type", "application/json")
                .body(register_body())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        // Doctor token: authenticated but forbidden
        let doctor_token = create_token(&doctor_id, "dr_a", "doctor", &jwt_config).unwrap();
        let resp = send(
            &mut app,
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/register")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {}", doctor_token))
                .body(register_body())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        // Admin token: created
        let admin_token = create_token(&admin_id, "root", "admin", &jwt_config).unwrap();
        let resp = send(
            &mut app,
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/register")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {}", admin_token))
                .body(register_body())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn garbage_token_is_unauthorized() {
        let (mut app, _, _) = test_app().await;
        let resp = send(
            &mut app,
            Request::builder()
                .uri("/api/v1/auth/me")
                .header("authorization", "Bearer garbage")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_cannot_use_clinical_card_lookup() {
        let (mut app, jwt_config, db) = test_app().await;
        let admin_id = seed_user(&db, "root", UserRole::Admin).await;
        let admin_token = create_token(&admin_id, "root", "admin", &jwt_config).unwrap();

        let resp = send(
            &mut app,
            Request::builder()
                .uri("/api/v1/patients/by-card/CARD-1")
                .header("authorization", format!("Bearer {}", admin_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
