// src/api.rs
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Datelike, Local, Utc};
use maud::{html, DOCTYPE};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::export::{ExportError, ReportRenderer, ReportView};
use crate::local_cache::CacheError;
use crate::model::{ActivityType, Month, MonthlyReport, Person, ReportKey, UserRole, WeeklyEntry};
use crate::remote::RemoteWrite;
use crate::report_draft::{ReportDraft, ReportError, WeekUpdate};
use crate::schedule::{format_masp, ProfileError, ProfileForm};
use crate::serde_lenient;
use crate::session::{self, SessionError};
use crate::state::{next_id, AppData, StateError};
use crate::sync::{LoadSource, Store, SyncError};

// --- Error Handling ---
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),

    #[error("Synchronisation failed: {0}")]
    Sync(#[from] SyncError),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Error occurred: {}", self);

        let (status, details) = match &self {
            AppError::Session(SessionError::MissingMasp) => (StatusCode::BAD_REQUEST, None),
            AppError::Session(SessionError::InvalidCredentials)
            | AppError::Session(SessionError::NotSignedIn) => (StatusCode::UNAUTHORIZED, None),
            AppError::Session(SessionError::WrongRole(_)) => (StatusCode::FORBIDDEN, None),
            AppError::Profile(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::to_value(&e.issues).ok(),
            ),
            AppError::Report(ReportError::WeekNotFound(_)) => (StatusCode::NOT_FOUND, None),
            AppError::Report(_) => (StatusCode::UNPROCESSABLE_ENTITY, None),
            AppError::State(StateError::TeacherNotFound(_))
            | AppError::State(StateError::ActivityTypeNotFound(_)) => (StatusCode::NOT_FOUND, None),
            AppError::State(StateError::DuplicateId(_)) => (StatusCode::CONFLICT, None),
            AppError::State(StateError::BlankActivityName) => {
                (StatusCode::UNPROCESSABLE_ENTITY, None)
            }
            AppError::Sync(SyncError::Cache(CacheError::InvalidUrl { .. })) => {
                (StatusCode::UNPROCESSABLE_ENTITY, None)
            }
            AppError::Export(_) | AppError::Sync(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, None),
        };

        let message = match &self {
            AppError::Session(e) => e.to_string(),
            AppError::Profile(e) => e.to_string(),
            AppError::Report(e) => e.to_string(),
            AppError::State(e) => e.to_string(),
            AppError::Export(_) => "Failed to export report. Details logged.".to_string(),
            AppError::Sync(SyncError::Cache(e @ CacheError::InvalidUrl { .. })) => e.to_string(),
            AppError::Sync(_) => "Internal server error (storage). Check logs.".to_string(),
            AppError::NotFound(what) => format!("{} not found", what),
        };

        (status, Json(json!({ "error": message, "details": details }))).into_response()
    }
}

// --- Application State ---
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub renderer: Arc<dyn ReportRenderer>,
}

pub fn router(state: AppState) -> Router {
    let session_routes = Router::new()
        .route("/", get(handle_get_session))
        .route("/login", post(handle_login))
        .route("/logout", post(handle_logout));

    let teacher_routes = Router::new()
        .route("/report", get(handle_get_own_report).put(handle_save_own_report))
        .route("/report/weeks", post(handle_add_week))
        .route("/report/weeks/{id}", patch(handle_update_week).delete(handle_remove_week))
        .route("/profile", get(handle_get_profile).put(handle_save_profile))
        .route("/activity-types", post(handle_add_activity_type));

    let supervisor_routes = Router::new()
        .route("/teachers", get(handle_list_teachers).post(handle_add_teacher))
        .route("/teachers/{id}", put(handle_update_teacher).delete(handle_delete_teacher))
        .route(
            "/activity-types",
            get(handle_list_activity_types).post(handle_add_activity_type),
        )
        .route("/activity-types/{id}", delete(handle_delete_activity_type))
        .route("/reports/{teacher_id}", get(handle_get_teacher_report))
        .route("/reports/{teacher_id}/export", get(handle_export_report));

    let api_routes = Router::new()
        .nest("/session", session_routes)
        .nest("/teacher", teacher_routes)
        .nest("/supervisor", supervisor_routes)
        .route("/activity-types", get(handle_list_activity_types))
        .route("/config/endpoint", get(handle_get_endpoint).put(handle_set_endpoint));

    Router::new()
        .nest("/api", api_routes)
        .route("/status", get(handle_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Request / Response Shapes ---
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub user: Person,
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    #[serde(default)]
    pub month: Option<Month>,
    #[serde(default)]
    pub year: Option<i32>,
}

impl PeriodQuery {
    /// Missing parts default to the current month and year.
    fn key(&self, teacher_id: &str) -> ReportKey {
        let today = Local::now().date_naive();
        ReportKey::new(
            teacher_id,
            self.month.unwrap_or_else(|| Month::of(today)),
            self.year.unwrap_or_else(|| today.year()),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReportRequest {
    pub month: Month,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "serde_lenient::records")]
    pub weeks: Vec<WeeklyEntry>,
}

#[derive(Debug, Deserialize)]
pub struct NewActivityType {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct EndpointRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct EndpointResponse {
    pub url: String,
    pub source: LoadSource,
}

/// A stored report, or the empty draft when nothing was saved yet.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    pub teacher_id: String,
    pub month: Month,
    pub year: i32,
    pub weeks: Vec<WeeklyEntry>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ReportPayload {
    fn for_key(key: ReportKey, stored: Option<&MonthlyReport>) -> Self {
        Self {
            weeks: stored.map(|r| r.weeks.clone()).unwrap_or_default(),
            last_updated: stored.map(|r| r.last_updated),
            teacher_id: key.teacher_id,
            month: key.month,
            year: key.year,
        }
    }
}

impl From<MonthlyReport> for ReportPayload {
    fn from(report: MonthlyReport) -> Self {
        Self {
            teacher_id: report.teacher_id,
            month: report.month,
            year: report.year,
            weeks: report.weeks,
            last_updated: Some(report.last_updated),
        }
    }
}

fn current_year() -> i32 {
    Local::now().year()
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Whoever sent the request, resolved from its `Authorization: Bearer` token.
pub struct Caller {
    token: Option<String>,
    identity: Option<Person>,
}

impl Caller {
    fn require(self, role: UserRole) -> Result<Person, AppError> {
        Ok(session::require_role(self.identity.as_ref(), role)?.clone())
    }

    fn signed_in(self) -> Result<Person, AppError> {
        self.identity.ok_or_else(|| SessionError::NotSignedIn.into())
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(session::bearer_token)
            .map(str::to_string);
        let identity = match &token {
            Some(token) => state.store.session(token).await,
            None => None,
        };
        Ok(Self { token, identity })
    }
}

/// Loads the draft for `key`, applies `edit`, and saves the result.
fn edit_report<T>(
    data: AppData,
    key: ReportKey,
    edit: impl FnOnce(&mut ReportDraft, &AppData) -> Result<T, AppError>,
) -> Result<(AppData, RemoteWrite, (T, MonthlyReport)), AppError> {
    let mut draft = ReportDraft::from_report(key.clone(), data.find_report(&key));
    let value = edit(&mut draft, &data)?;
    let report = draft.into_report(Utc::now())?;
    let data = data.save_report(report.clone());
    Ok((data, RemoteWrite::SaveReport(report.clone()), (value, report)))
}

// --- Session Handlers ---
async fn handle_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let teachers = state.store.read(|d| d.teachers.clone()).await;
    let identity = session::authenticate(&request.username, &request.password, &teachers)?;
    let token = state.store.sign_in(identity.clone()).await;
    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer",
        user: identity,
    }))
}

async fn handle_logout(State(state): State<AppState>, caller: Caller) -> StatusCode {
    if let Some(token) = &caller.token {
        state.store.sign_out(token).await;
    }
    StatusCode::NO_CONTENT
}

async fn handle_get_session(caller: Caller) -> Json<Option<Person>> {
    Json(caller.identity)
}

// --- Teacher Handlers ---
async fn handle_get_own_report(
    State(state): State<AppState>,
    caller: Caller,
    Query(period): Query<PeriodQuery>,
) -> Result<Json<ReportPayload>, AppError> {
    let teacher = caller.require(UserRole::Teacher)?;
    let key = period.key(&teacher.id);
    let payload = state
        .store
        .read(|d| ReportPayload::for_key(key.clone(), d.find_report(&key)))
        .await;
    Ok(Json(payload))
}

async fn handle_save_own_report(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<SaveReportRequest>,
) -> Result<Json<ReportPayload>, AppError> {
    let teacher = caller.require(UserRole::Teacher)?;
    let key = ReportKey::new(
        teacher.id.clone(),
        request.month,
        request.year.unwrap_or_else(current_year),
    );
    let draft = ReportDraft {
        key,
        weeks: request.weeks,
    };
    let report = draft.into_report(Utc::now())?;

    let saved = state
        .store
        .commit(|data| {
            let data = data.save_report(report.clone());
            Ok::<_, AppError>((data, RemoteWrite::SaveReport(report.clone()), report))
        })
        .await?;
    info!("Teacher {} saved report {}", teacher.id, saved.key());
    Ok(Json(saved.into()))
}

async fn handle_add_week(
    State(state): State<AppState>,
    caller: Caller,
    Query(period): Query<PeriodQuery>,
) -> Result<(StatusCode, Json<WeeklyEntry>), AppError> {
    let teacher = caller.require(UserRole::Teacher)?;
    let key = period.key(&teacher.id);
    let (week, _) = state
        .store
        .commit(|data| {
            edit_report(data, key, |draft, _| {
                let id = next_id(now_millis(), draft.weeks.iter().map(|w| w.id.as_str()));
                Ok(draft.add_week(id).clone())
            })
        })
        .await?;
    Ok((StatusCode::CREATED, Json(week)))
}

async fn handle_update_week(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Query(period): Query<PeriodQuery>,
    Json(update): Json<WeekUpdate>,
) -> Result<Json<WeeklyEntry>, AppError> {
    let teacher = caller.require(UserRole::Teacher)?;
    let key = period.key(&teacher.id);
    let (week, _) = state
        .store
        .commit(|data| {
            edit_report(data, key, |draft, data| {
                Ok(draft
                    .update_week(&id, update, &data.activity_types)?
                    .clone())
            })
        })
        .await?;
    Ok(Json(week))
}

async fn handle_remove_week(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Query(period): Query<PeriodQuery>,
) -> Result<Json<ReportPayload>, AppError> {
    let teacher = caller.require(UserRole::Teacher)?;
    let key = period.key(&teacher.id);
    let ((), report) = state
        .store
        .commit(|data| edit_report(data, key, |draft, _| Ok(draft.remove_week(&id)?)))
        .await?;
    Ok(Json(report.into()))
}

async fn handle_get_profile(caller: Caller) -> Result<Json<ProfileForm>, AppError> {
    let teacher = caller.require(UserRole::Teacher)?;
    Ok(Json(ProfileForm::from_teacher(&teacher)))
}

async fn handle_save_profile(
    State(state): State<AppState>,
    caller: Caller,
    Json(mut form): Json<ProfileForm>,
) -> Result<Json<Person>, AppError> {
    let teacher = caller.require(UserRole::Teacher)?;
    form.masp = format_masp(&form.masp);
    let updated = form.into_teacher(teacher.id.clone())?;
    let saved = state
        .store
        .commit(|data| {
            let data = data.update_teacher(updated.clone())?;
            Ok::<_, AppError>((data, RemoteWrite::SaveTeacher(updated.clone()), updated))
        })
        .await?;
    Ok(Json(saved))
}

/// Open to both roles.
async fn handle_add_activity_type(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<NewActivityType>,
) -> Result<(StatusCode, Json<ActivityType>), AppError> {
    caller.signed_in()?;
    let added = state
        .store
        .commit(|data| {
            let id = data.next_activity_id(now_millis());
            let (data, added) = data.add_activity_type(&request.name, id)?;
            Ok::<_, AppError>((data, RemoteWrite::SaveActivityType(added.clone()), added))
        })
        .await?;
    Ok((StatusCode::CREATED, Json(added)))
}

async fn handle_list_activity_types(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<ActivityType>>, AppError> {
    caller.signed_in()?;
    Ok(Json(state.store.read(|d| d.activity_types.clone()).await))
}

// --- Supervisor Handlers ---
async fn handle_list_teachers(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<Person>>, AppError> {
    caller.require(UserRole::Supervisor)?;
    Ok(Json(state.store.read(|d| d.teachers.clone()).await))
}

async fn handle_add_teacher(
    State(state): State<AppState>,
    caller: Caller,
    Json(mut form): Json<ProfileForm>,
) -> Result<(StatusCode, Json<Person>), AppError> {
    caller.require(UserRole::Supervisor)?;
    form.masp = format_masp(&form.masp);
    form.validate()?;
    let added = state
        .store
        .commit(|data| {
            let teacher = form.teacher_record(data.next_teacher_id(now_millis()));
            let data = data.add_teacher(teacher.clone())?;
            Ok::<_, AppError>((data, RemoteWrite::SaveTeacher(teacher.clone()), teacher))
        })
        .await?;
    Ok((StatusCode::CREATED, Json(added)))
}

async fn handle_update_teacher(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(mut form): Json<ProfileForm>,
) -> Result<Json<Person>, AppError> {
    caller.require(UserRole::Supervisor)?;
    form.masp = format_masp(&form.masp);
    let updated = form.into_teacher(id)?;
    let saved = state
        .store
        .commit(|data| {
            let data = data.update_teacher(updated.clone())?;
            Ok::<_, AppError>((data, RemoteWrite::SaveTeacher(updated.clone()), updated))
        })
        .await?;
    Ok(Json(saved))
}

async fn handle_delete_teacher(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    caller.require(UserRole::Supervisor)?;
    state
        .store
        .commit(|data| {
            let data = data.delete_teacher(&id)?;
            Ok::<_, AppError>((data, RemoteWrite::DeleteTeacher { id: id.clone() }, ()))
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_delete_activity_type(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    caller.require(UserRole::Supervisor)?;
    state
        .store
        .commit(|data| {
            let data = data.delete_activity_type(&id)?;
            Ok::<_, AppError>((data, RemoteWrite::DeleteActivityType { id: id.clone() }, ()))
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_get_teacher_report(
    State(state): State<AppState>,
    caller: Caller,
    Path(teacher_id): Path<String>,
    Query(period): Query<PeriodQuery>,
) -> Result<Json<ReportPayload>, AppError> {
    caller.require(UserRole::Supervisor)?;
    let key = period.key(&teacher_id);
    let payload = state
        .store
        .read(|d| {
            d.teacher(&teacher_id)
                .map(|_| ReportPayload::for_key(key.clone(), d.find_report(&key)))
        })
        .await
        .ok_or_else(|| AppError::NotFound(format!("Teacher {}", teacher_id)))?;
    Ok(Json(payload))
}

async fn handle_export_report(
    State(state): State<AppState>,
    caller: Caller,
    Path(teacher_id): Path<String>,
    Query(period): Query<PeriodQuery>,
) -> Result<Response, AppError> {
    caller.require(UserRole::Supervisor)?;
    let key = period.key(&teacher_id);
    let view = state
        .store
        .read(|d| {
            let teacher = d.teacher(&teacher_id)?;
            let weeks = d.find_report(&key).map(|r| r.weeks.as_slice()).unwrap_or(&[]);
            Some(ReportView::bind(teacher, key.month, weeks))
        })
        .await
        .ok_or_else(|| AppError::NotFound(format!("Teacher {}", teacher_id)))?;

    let document = state.renderer.render(&view)?;
    info!("Exported {} for {}", document.file_name, key);

    let ascii_name: String = document
        .file_name
        .chars()
        .map(|c| if c.is_ascii() && c != '"' { c } else { '_' })
        .collect();
    let encoded: String = url::form_urlencoded::byte_serialize(document.file_name.as_bytes()).collect();
    let disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_name, encoded
    );
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| ExportError::Render(format!("invalid file name header: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(document.content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document.bytes,
    )
        .into_response())
}

// --- Shared Handlers ---
async fn handle_get_endpoint(State(state): State<AppState>) -> Json<EndpointResponse> {
    Json(EndpointResponse {
        url: state.store.endpoint().await.to_string(),
        source: state.store.source().await,
    })
}

async fn handle_set_endpoint(
    State(state): State<AppState>,
    Json(request): Json<EndpointRequest>,
) -> Result<Json<EndpointResponse>, AppError> {
    let (url, source) = state.store.set_endpoint(&request.url).await?;
    if source != LoadSource::Remote {
        warn!("New endpoint {} is unavailable; loaded {}", url, source);
    }
    Ok(Json(EndpointResponse {
        url: url.to_string(),
        source,
    }))
}

async fn handle_status(State(state): State<AppState>) -> Html<String> {
    info!("Handling /status request");
    let endpoint = state.store.endpoint().await;
    let source = state.store.source().await;
    let sessions = state.store.session_count().await;
    let (teachers, reports, activities) = state
        .store
        .read(|d| (d.teachers.len(), d.reports.len(), d.activity_types.len()))
        .await;

    let page = html! {
        (DOCTYPE)
        html {
            head { meta charset="UTF-8"; title { "Server Status" } }
            body {
                h1 { "Server Status" }
                p { "Current Time (Server): " (Local::now().to_rfc3339()) }
                p { "Endpoint: " (endpoint.as_str()) }
                p { "Data loaded from: " (source.to_string()) }
                p { (teachers) " teacher(s), " (reports) " report(s), " (activities) " activity type(s)" }
                p { "Active sessions: " (sessions) }
            }
        }
    };
    Html(page.into_string())
}
