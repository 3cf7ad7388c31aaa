use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Error as AnyhowError;
use once_cell::sync::OnceCell;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use models::{DomainError, FieldError, ValidationError};
use security::{AuthError, TokenSettings};
use storage::HealthStore;

pub mod auth;
pub mod config;
pub mod grants;
pub mod handlers;
pub mod policy;

pub use crate::config::{load_api_settings, ApiSettings};

// Flipped once at startup; 500 bodies carry detail only in development.
static DEVELOPMENT_MODE: OnceCell<bool> = OnceCell::new();

pub fn set_development_mode(enabled: bool) {
    let _ = DEVELOPMENT_MODE.set(enabled);
}

fn development_mode() -> bool {
    DEVELOPMENT_MODE.get().copied().unwrap_or(false)
}

// Define the REST API error enum
#[derive(Debug, Error)]
pub enum RestApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] AnyhowError),
}

impl RestApiError {
    fn status(&self) -> StatusCode {
        match self {
            RestApiError::Auth(err) => match err {
                AuthError::MissingCredential
                | AuthError::InvalidToken
                | AuthError::TokenExpired
                | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::UserExists => StatusCode::BAD_REQUEST,
                AuthError::UserNotFound | AuthError::PatientNotFound => StatusCode::NOT_FOUND,
                AuthError::AccountDeactivated
                | AuthError::AccessDenied(_)
                | AuthError::ProfileNotFound(_)
                | AuthError::ProfileNotApproved(_)
                | AuthError::EmergencyAccessDisabled
                | AuthError::InvalidEmergencyCode => StatusCode::FORBIDDEN,
                AuthError::JwtError(_) | AuthError::StorageError(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            RestApiError::Domain(err) => match err {
                DomainError::NotFound(_) | DomainError::PermissionNotFound => {
                    StatusCode::NOT_FOUND
                }
                DomainError::AlreadyExists(_)
                | DomainError::InvalidData(_)
                | DomainError::DuplicateActiveGrant
                | DomainError::GranteeNotEligible
                | DomainError::InvalidStatusTransition { .. }
                | DomainError::CannotModifyApprovedProfile(_)
                | DomainError::Validation(_) => StatusCode::BAD_REQUEST,
                DomainError::StorageError(_)
                | DomainError::LockError(_)
                | DomainError::SerializationError(_)
                | DomainError::InternalError(_)
                | DomainError::Io(_)
                | DomainError::Uuid(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            RestApiError::Validation(_) => StatusCode::BAD_REQUEST,
            RestApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RestApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            RestApiError::NotFound(_) => StatusCode::NOT_FOUND,
            RestApiError::SerdeJson(_) => StatusCode::BAD_REQUEST,
            RestApiError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn field_errors(&self) -> Option<&[FieldError]> {
        match self {
            RestApiError::Validation(ValidationError::Fields(errors))
            | RestApiError::Domain(DomainError::Validation(ValidationError::Fields(errors))) => {
                Some(errors)
            }
            _ => None,
        }
    }
}

// Implement IntoResponse for RestApiError to convert it into an HTTP response
impl IntoResponse for RestApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR && !development_mode() {
            error!("Internal error: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut body = json!({
            "status": "error",
            "message": message,
        });
        if let Some(errors) = self.field_errors() {
            body["errors"] = json!(errors);
        }

        (status, Json(body)).into_response()
    }
}

// Shared state for the Axum application
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn HealthStore>,
    pub settings: Arc<ApiSettings>,
    pub tokens: TokenSettings,
}

impl AppState {
    pub fn new(store: Arc<dyn HealthStore>, settings: ApiSettings) -> Self {
        let tokens = settings.tokens();
        AppState {
            store,
            settings: Arc::new(settings),
            tokens,
        }
    }
}

// Handler for /health
async fn health_check_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "success", "message": "Health records API is running" })),
    )
}

/// Assembles the full route table over the shared state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health_check_handler))
        // auth and accounts
        .route("/api/v1/users/register", post(handlers::auth::register_handler))
        .route("/api/v1/users/auth", post(handlers::auth::login_handler))
        .route("/api/v1/users/logout", post(handlers::auth::logout_handler))
        .route("/api/v1/users/refresh", get(handlers::auth::refresh_handler))
        .route("/api/v1/users/me", get(handlers::users::current_user_handler))
        .route("/api/v1/users", get(handlers::users::list_users_handler))
        .route("/api/v1/users/role", put(handlers::users::update_role_handler))
        // patients
        .route(
            "/api/v1/patients/profile/me",
            get(handlers::patients::get_my_profile_handler)
                .put(handlers::patients::upsert_my_profile_handler),
        )
        .route(
            "/api/v1/patients/profile/:user_id",
            get(handlers::patients::get_profile_handler),
        )
        .route(
            "/api/v1/patients/emergency-access",
            put(handlers::patients::configure_emergency_access_handler),
        )
        .route(
            "/api/v1/patients/medical-records",
            get(handlers::patients::my_medical_records_handler),
        )
        .route(
            "/api/v1/patients/prescriptions",
            get(handlers::patients::my_prescriptions_handler),
        )
        .route(
            "/api/v1/patients/lab-tests",
            get(handlers::patients::my_lab_tests_handler),
        )
        .route("/api/v1/patients/grant", post(handlers::patients::grant_access_handler))
        .route(
            "/api/v1/patients/revoke/:permission_id",
            delete(handlers::patients::revoke_access_handler),
        )
        .route(
            "/api/v1/patients/granted-accesses",
            get(handlers::patients::granted_accesses_handler),
        )
        .route(
            "/api/v1/patients/check-access/:patient_id",
            get(handlers::patients::check_access_handler),
        )
        // doctors
        .route(
            "/api/v1/doctors/profile/me",
            get(handlers::doctors::get_my_profile_handler)
                .put(handlers::doctors::upsert_my_profile_handler),
        )
        .route("/api/v1/doctors", get(handlers::doctors::list_doctors_handler))
        .route(
            "/api/v1/doctors/patients/:patient_id/medical-records",
            get(handlers::doctors::patient_records_handler)
                .post(handlers::doctors::create_record_handler),
        )
        .route(
            "/api/v1/doctors/medical-records/:id",
            put(handlers::doctors::update_record_handler)
                .delete(handlers::doctors::delete_record_handler),
        )
        .route(
            "/api/v1/doctors/prescriptions",
            get(handlers::doctors::list_prescriptions_handler)
                .post(handlers::doctors::create_prescription_handler),
        )
        .route(
            "/api/v1/doctors/lab-tests",
            get(handlers::doctors::list_lab_tests_handler)
                .post(handlers::doctors::order_lab_test_handler),
        )
        .route(
            "/api/v1/doctors/lab-tests/:id/interpret",
            put(handlers::doctors::interpret_lab_test_handler),
        )
        .route(
            "/api/v1/doctors/lab-tests/:id/cancel",
            put(handlers::doctors::cancel_lab_test_handler),
        )
        // laboratories
        .route(
            "/api/v1/laboratories/profile/me",
            get(handlers::laboratories::get_my_profile_handler)
                .put(handlers::laboratories::upsert_my_profile_handler),
        )
        .route(
            "/api/v1/laboratories",
            get(handlers::laboratories::list_laboratories_handler),
        )
        .route(
            "/api/v1/laboratories/tests",
            get(handlers::laboratories::work_queue_handler),
        )
        .route(
            "/api/v1/laboratories/tests/:id/status",
            put(handlers::laboratories::update_test_status_handler),
        )
        .route(
            "/api/v1/laboratories/tests/:id/results",
            put(handlers::laboratories::deposit_results_handler),
        )
        // shared record views
        .route(
            "/api/v1/medical-records/search",
            get(handlers::records::search_records_handler),
        )
        .route(
            "/api/v1/medical-records/stats",
            get(handlers::records::record_stats_handler),
        )
        .route(
            "/api/v1/medical-records/types",
            get(handlers::records::record_types_handler),
        )
        .route(
            "/api/v1/medical-records/:id",
            get(handlers::records::get_record_handler),
        )
        .route(
            "/api/v1/medical-records/:id/restore",
            put(handlers::records::restore_record_handler),
        )
        // admin
        .route(
            "/api/v1/admin/validate-professional",
            post(handlers::admin::validate_professional_handler),
        )
        .route(
            "/api/v1/admin/pending-validations",
            get(handlers::admin::pending_validations_handler),
        )
        .route(
            "/api/v1/admin/manage-user",
            put(handlers::admin::manage_user_handler),
        )
        .route("/api/v1/admin/statistics", get(handlers::admin::statistics_handler))
        .route(
            "/api/v1/admin/access-permissions",
            get(handlers::admin::access_permissions_handler),
        )
        // emergency break-glass
        .route(
            "/api/v1/emergency/records",
            post(handlers::emergency::emergency_records_handler),
        )
        .with_state(state)
        .layer(cors)
}

// Main function to start the REST API server
pub async fn start_server(
    state: AppState,
    shutdown_rx: oneshot::Receiver<()>,
) -> Result<(), AnyhowError> {
    set_development_mode(state.settings.is_development());

    let addr: SocketAddr = format!("{}:{}", state.settings.host, state.settings.port)
        .parse()
        .context("Invalid REST API bind address")?;

    let app = create_router(state);

    let shutdown_signal = async {
        let _ = shutdown_rx.await;
        info!("Received shutdown signal.");
    };

    let listener = TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind to address: {}", addr))?;
    info!("REST API server listening on {}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("REST API server failed to start or run")?;

    info!("REST API server stopped.");
    Ok(())
}
