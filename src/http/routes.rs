//! HTTP route definitions

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, patch, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use uuid::Uuid;

use crate::access::permissions::MatrixRow;
use crate::access::platform_role::{PlatformRole, PlatformRoleResolver};
use crate::app::AppState;
use crate::data::accessor::ModuleRecordAccessor;
use crate::data::demo::DEMO_TENANT_ID;
use crate::data::error::DataError;
use crate::data::files::{ProjectFiles, StoredFile};
use crate::data::module::ModuleKey;
use crate::data::provider::{DataMode, DataProvider};
use crate::data::record::ModuleRecord;
use crate::http::middleware::{
    attach_session, enter_route, require_auth, AuthenticatedUser, CLIENT_SESSION_HEADER,
};
use crate::session::guard::NavigationOutcome;
use crate::session::registry::ClientSession;
use crate::util::time::uptime_secs;

/// Where a client lands when nothing was remembered
const DEFAULT_LANDING_PATH: &str = "/app";

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            CLIENT_SESSION_HEADER.clone(),
        ])
        .allow_credentials(true);

    // Public routes (no session, no auth)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/permissions/matrix", get(matrix_handler));

    // Session bookkeeping; not a navigation into a data route
    let session_routes = Router::new()
        .route("/session/navigate", post(navigate_handler))
        .route(
            "/session/last-path",
            get(last_path_handler).delete(clear_last_path_handler),
        )
        .layer(middleware::from_fn_with_state(state.clone(), attach_session));

    let demo_routes = Router::new()
        .route(
            "/demo/projects/:project/modules/:module/records",
            get(list_records_handler).post(create_record_handler),
        )
        .route(
            "/demo/projects/:project/modules/:module/records/:id",
            patch(update_record_handler).delete(remove_record_handler),
        )
        .route("/demo/projects/:project/files", get(list_files_handler))
        .route(
            "/demo/projects/:project/files/:name",
            put(upload_file_handler).delete(remove_file_handler),
        )
        .layer(middleware::from_fn(enter_route))
        .layer(middleware::from_fn_with_state(state.clone(), attach_session));

    // Live routes (auth required); the guard runs once the caller is known
    let live_routes = Router::new()
        .route(
            "/app/tenants/:tenant/projects/:project/modules/:module/records",
            get(list_records_handler).post(create_record_handler),
        )
        .route(
            "/app/tenants/:tenant/projects/:project/modules/:module/records/:id",
            patch(update_record_handler).delete(remove_record_handler),
        )
        .route(
            "/app/tenants/:tenant/projects/:project/files",
            get(list_files_handler),
        )
        .route(
            "/app/tenants/:tenant/projects/:project/files/:name",
            put(upload_file_handler).delete(remove_file_handler),
        )
        .route("/app/platform-role", get(platform_role_handler))
        .layer(middleware::from_fn(enter_route))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(middleware::from_fn_with_state(state.clone(), attach_session));

    Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .merge(demo_routes)
        .merge(live_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health and catalog endpoints
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_sessions: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_sessions: state.sessions.active_sessions(),
    })
}

#[derive(Serialize)]
struct MatrixResponse {
    capabilities: Vec<&'static str>,
    roles: Vec<MatrixRow>,
}

async fn matrix_handler(State(state): State<AppState>) -> Json<MatrixResponse> {
    Json(MatrixResponse {
        capabilities: state.matrix.capabilities().to_vec(),
        roles: state.matrix.rows(),
    })
}

// ============================================================================
// Session endpoints
// ============================================================================

#[derive(Deserialize)]
struct NavigateRequest {
    path: String,
    #[serde(default)]
    query: Option<String>,
}

#[derive(Serialize)]
struct NavigateResponse {
    #[serde(flatten)]
    outcome: NavigationOutcome,
    remembered: bool,
}

async fn navigate_handler(
    Extension(session): Extension<Arc<ClientSession>>,
    Json(req): Json<NavigateRequest>,
) -> Result<Json<NavigateResponse>, AppError> {
    if !req.path.starts_with('/') {
        return Err(AppError::BadRequest(format!("'{}' is not a route", req.path)));
    }

    let outcome = session
        .clone()
        .enter(req.path.clone())
        .await
        .map_err(|e| AppError::Internal(format!("entry guard: {}", e)))?;

    // Only live routes are worth resuming into
    let remembered = if outcome.mode == DataMode::Live {
        session
            .path_memory()
            .save_last_path(&req.path, req.query.as_deref())
            .unwrap_or_else(|e| {
                warn!(error = %e, "Could not remember last path");
                false
            })
    } else {
        false
    };

    Ok(Json(NavigateResponse {
        outcome,
        remembered,
    }))
}

#[derive(Deserialize)]
struct LastPathQuery {
    fallback: Option<String>,
}

#[derive(Serialize)]
struct LastPathResponse {
    path: String,
}

async fn last_path_handler(
    Extension(session): Extension<Arc<ClientSession>>,
    Query(query): Query<LastPathQuery>,
) -> Json<LastPathResponse> {
    let fallback = query.fallback.as_deref().unwrap_or(DEFAULT_LANDING_PATH);
    Json(LastPathResponse {
        path: session.path_memory().get_last_path(fallback),
    })
}

async fn clear_last_path_handler(
    Extension(session): Extension<Arc<ClientSession>>,
) -> Result<StatusCode, AppError> {
    session
        .path_memory()
        .clear_last_path()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Module record endpoints (demo and live share handlers)
// ============================================================================

/// Absent `tenant` means a demo route
#[derive(Deserialize)]
struct ScopePath {
    #[serde(default)]
    tenant: Option<String>,
    project: String,
    module: String,
}

#[derive(Deserialize)]
struct RecordPath {
    #[serde(default)]
    tenant: Option<String>,
    project: String,
    module: String,
    id: String,
}

fn accessor_for(
    provider: &DataProvider,
    tenant: Option<&str>,
    project: &str,
    module: &str,
) -> Result<ModuleRecordAccessor, AppError> {
    let key: ModuleKey = module
        .parse()
        .map_err(|_| AppError::NotFound(format!("no module '{}'", module)))?;
    Ok(provider.accessor(tenant.unwrap_or(DEMO_TENANT_ID), project, key))
}

/// Ids that cannot name a record simply do not exist
fn record_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(format!("record {}", raw)))
}

async fn list_records_handler(
    Extension(provider): Extension<Arc<DataProvider>>,
    Path(path): Path<ScopePath>,
) -> Result<Json<Vec<ModuleRecord>>, AppError> {
    let accessor = accessor_for(&provider, path.tenant.as_deref(), &path.project, &path.module)?;
    Ok(Json(accessor.list().await?))
}

async fn create_record_handler(
    Extension(provider): Extension<Arc<DataProvider>>,
    Path(path): Path<ScopePath>,
    Json(input): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let accessor = accessor_for(&provider, path.tenant.as_deref(), &path.project, &path.module)?;
    let record = accessor.create(input).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_record_handler(
    Extension(provider): Extension<Arc<DataProvider>>,
    Path(path): Path<RecordPath>,
    Json(input): Json<Value>,
) -> Result<Json<ModuleRecord>, AppError> {
    let accessor = accessor_for(&provider, path.tenant.as_deref(), &path.project, &path.module)?;
    let record = accessor.update(record_id(&path.id)?, input).await?;
    Ok(Json(record))
}

async fn remove_record_handler(
    Extension(provider): Extension<Arc<DataProvider>>,
    Path(path): Path<RecordPath>,
) -> Result<StatusCode, AppError> {
    let accessor = accessor_for(&provider, path.tenant.as_deref(), &path.project, &path.module)?;
    accessor.remove(record_id(&path.id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Project file endpoints
// ============================================================================

#[derive(Deserialize)]
struct ProjectPath {
    #[serde(default)]
    tenant: Option<String>,
    project: String,
}

#[derive(Deserialize)]
struct FilePath {
    #[serde(default)]
    tenant: Option<String>,
    project: String,
    name: String,
}

fn files_for(provider: &DataProvider, tenant: Option<&str>, project: &str) -> ProjectFiles {
    provider.files(tenant.unwrap_or(DEMO_TENANT_ID), project)
}

async fn list_files_handler(
    Extension(provider): Extension<Arc<DataProvider>>,
    Path(path): Path<ProjectPath>,
) -> Result<Json<Vec<StoredFile>>, AppError> {
    let files = files_for(&provider, path.tenant.as_deref(), &path.project)
        .list()
        .await?;
    Ok(Json(files))
}

async fn upload_file_handler(
    Extension(provider): Extension<Arc<DataProvider>>,
    Path(path): Path<FilePath>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("application/octet-stream");

    let stored = files_for(&provider, path.tenant.as_deref(), &path.project)
        .upload(&path.name, body, content_type)
        .await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn remove_file_handler(
    Extension(provider): Extension<Arc<DataProvider>>,
    Path(path): Path<FilePath>,
) -> Result<StatusCode, AppError> {
    files_for(&provider, path.tenant.as_deref(), &path.project)
        .remove(&path.name)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Platform role endpoint
// ============================================================================

#[derive(Serialize)]
struct PlatformRoleResponse {
    user_id: String,
    platform_role: Option<PlatformRole>,
}

async fn platform_role_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<PlatformRoleResponse>, AppError> {
    let resolver =
        PlatformRoleResolver::from_supabase(state.supabase.with_access_token(&auth.access_token));
    let platform_role = resolver.platform_role(&auth.user_id).await?;

    Ok(Json(PlatformRoleResponse {
        user_id: auth.user_id,
        platform_role,
    }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Upstream error: {0}")]
    BadGateway(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DataError> for AppError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Unscoped(msg) => AppError::BadRequest(msg),
            DataError::Invalid(msg) => AppError::Unprocessable(msg),
            DataError::NotFound(msg) => AppError::NotFound(msg),
            DataError::Forbidden(msg) => AppError::Forbidden(msg),
            DataError::SchemaAbsent(msg) | DataError::Transient(msg) => AppError::BadGateway(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_errors_map_to_statuses() {
        let cases = [
            (DataError::Unscoped("x".into()), StatusCode::BAD_REQUEST),
            (DataError::Invalid("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (DataError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (DataError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (DataError::Transient("x".into()), StatusCode::BAD_GATEWAY),
            (DataError::SchemaAbsent("x".into()), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
