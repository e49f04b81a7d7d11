use crate::auth::Caller;
use crate::config::Paging;
use crate::response::{self, ApiError};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use dispatch_core::{
    DispatchError, DispatchService, IncidentFilter, IncidentType, ListQuery, Period, Priority, Role,
    SortOrder, SqliteStore, Status, StatusUpdate,
};
use report_registry::{GuestReportV1, OperatorReportV1};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub service: DispatchService<SqliteStore>,
    pub paging: Paging,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/emergencies", get(list_incidents))
        .route("/emergencies/report", post(report_guest))
        .route("/emergencies/report/schema", get(report_schema))
        .route("/emergencies/call-operator", post(report_by_operator))
        .route("/emergencies/assigned", get(list_assigned))
        .route("/emergencies/stats", get(stats))
        .route("/emergencies/:id", get(get_incident).delete(delete_incident))
        .route("/emergencies/:id/status", put(update_status))
        .route("/emergencies/:id/status-simple", put(update_status_simple))
        .route("/emergencies/:id/assign", put(assign))
        .route("/emergencies/:id/priority", put(set_priority))
        .route("/emergencies/:id/notes", post(add_note))
        .route("/emergencies/:id/timeline", get(timeline))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub incident_type: Option<String>,
    pub priority: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedParams {
    pub status: Option<String>,
    pub priority: Option<String>,
    /// Admins may look up another responder's queue.
    pub responder_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub period: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub status: Option<String>,
    pub notes: Option<String>,
    pub assigned_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SimpleStatusBody {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBody {
    pub user_id: Option<String>,
    pub user_model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PriorityBody {
    pub priority: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteBody {
    pub note: Option<String>,
    #[serde(default)]
    pub is_private: bool,
}

async fn health() -> Response {
    response::ok("ok", serde_json::json!({ "status": "ok" }))
}

async fn report_guest(
    State(state): State<AppState>,
    body: Result<Json<GuestReportV1>, JsonRejection>,
) -> Result<Response, ApiError> {
    let form = json_body(body)?;
    let incident = run(&state, move |service| service.report_guest(&form)).await?;
    Ok(response::created("Emergency reported successfully", incident))
}

async fn report_schema() -> Result<Response, ApiError> {
    let schemas = report_registry::report_schemas().map_err(ApiError::internal)?;
    Ok(response::ok("Report schemas", schemas))
}

async fn report_by_operator(
    State(state): State<AppState>,
    Caller(actor): Caller,
    body: Result<Json<OperatorReportV1>, JsonRejection>,
) -> Result<Response, ApiError> {
    let form = json_body(body)?;
    let incident = run(&state, move |service| service.report_by_operator(&form, &actor)).await?;
    Ok(response::created("Emergency reported by call operator", incident))
}

async fn list_incidents(
    State(state): State<AppState>,
    Caller(actor): Caller,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let params = query_params(params)?;
    let query = ListQuery {
        filter: IncidentFilter {
            status: parse_opt::<Status>(params.status.as_deref())?,
            incident_type: parse_opt::<IncidentType>(params.incident_type.as_deref())?,
            priority: parse_opt::<Priority>(params.priority.as_deref())?,
        },
        page: params.page.unwrap_or(1).max(1),
        limit: state.paging.clamp(params.limit),
        sort: parse_opt::<SortOrder>(params.sort.as_deref())?.unwrap_or_default(),
    };
    let page = run(&state, move |service| service.list_incidents(&query, &actor)).await?;
    Ok(response::paged("Emergencies retrieved", page))
}

async fn get_incident(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let incident = run(&state, move |service| service.get_incident(&id, &actor)).await?;
    Ok(response::ok("Emergency retrieved", incident))
}

async fn update_status(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    body: Result<Json<StatusBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(body)?;
    let update = StatusUpdate {
        status: parse_opt::<Status>(body.status.as_deref())?,
        notes: body.notes,
        assigned_to: body.assigned_to.filter(|v| !v.trim().is_empty()),
    };
    if update.status.is_none() && update.assigned_to.is_none() {
        return Err(DispatchError::validation("status", "status is required").into());
    }
    let incident = run(&state, move |service| service.update_status(&id, &update, &actor)).await?;
    Ok(response::ok("Emergency status updated", incident))
}

async fn update_status_simple(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    body: Result<Json<SimpleStatusBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(body)?;
    let status = parse_opt::<Status>(body.status.as_deref())?
        .ok_or_else(|| DispatchError::validation("status", "status is required"))?;
    let incident = run(&state, move |service| service.update_status_simple(&id, status, &actor)).await?;
    Ok(response::ok("Emergency status updated", incident))
}

async fn assign(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    body: Result<Json<AssignBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(body)?;
    let responder_id = body
        .user_id
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| DispatchError::validation("userId", "userId is required"))?;
    let role = body
        .user_model
        .as_deref()
        .map(Role::from_user_model)
        .transpose()?
        .ok_or_else(|| DispatchError::validation("userModel", "userModel is required"))?;
    let incident = run(&state, move |service| service.assign(&id, &responder_id, role, &actor)).await?;
    Ok(response::ok("Emergency assigned", incident))
}

async fn set_priority(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    body: Result<Json<PriorityBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(body)?;
    let priority = parse_opt::<Priority>(body.priority.as_deref())?
        .ok_or_else(|| DispatchError::validation("priority", "priority is required"))?;
    let incident = run(&state, move |service| service.set_priority(&id, priority, &actor)).await?;
    Ok(response::ok("Emergency priority updated", incident))
}

async fn add_note(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    body: Result<Json<NoteBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(body)?;
    let note = body.note.unwrap_or_default();
    let is_private = body.is_private;
    let incident = run(&state, move |service| service.add_note(&id, &note, is_private, &actor)).await?;
    Ok(response::created("Note added", incident))
}

async fn delete_incident(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    run(&state, move |service| service.delete_incident(&id, &actor)).await?;
    Ok(response::message_only("Emergency deleted"))
}

async fn list_assigned(
    State(state): State<AppState>,
    Caller(actor): Caller,
    params: Result<Query<AssignedParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let params = query_params(params)?;
    let filter = IncidentFilter {
        status: parse_opt::<Status>(params.status.as_deref())?,
        incident_type: None,
        priority: parse_opt::<Priority>(params.priority.as_deref())?,
    };
    let responder_id = params.responder_id.unwrap_or_else(|| actor.id.clone());
    let incidents =
        run(&state, move |service| service.list_assigned(&responder_id, &filter, &actor)).await?;
    Ok(response::ok("Assigned emergencies retrieved", incidents))
}

async fn stats(
    State(state): State<AppState>,
    Caller(actor): Caller,
    params: Result<Query<StatsParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let params = query_params(params)?;
    let period = parse_opt::<Period>(params.period.as_deref())?.unwrap_or_default();
    let snapshot = run(&state, move |service| service.stats(period, &actor)).await?;
    Ok(response::ok("Emergency statistics", snapshot))
}

async fn timeline(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let events = run(&state, move |service| service.timeline(&id, &actor)).await?;
    Ok(response::ok("Emergency timeline", events))
}

/// Runs a store-backed service call off the async executor.
async fn run<T, F>(state: &AppState, call: F) -> Result<T, ApiError>
where
    F: FnOnce(&DispatchService<SqliteStore>) -> Result<T, DispatchError> + Send + 'static,
    T: Send + 'static,
{
    let service = state.service.clone();
    tokio::task::spawn_blocking(move || call(&service))
        .await
        .map_err(|e| ApiError::internal(format!("dispatch task failed: {e}")))?
        .map_err(ApiError::from)
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request("ValidationError", rejection.body_text()))
}

fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    params
        .map(|Query(value)| value)
        .map_err(|rejection| ApiError::bad_request("ValidationError", rejection.body_text()))
}

fn parse_opt<T>(raw: Option<&str>) -> Result<Option<T>, ApiError>
where
    T: std::str::FromStr<Err = DispatchError>,
{
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::parse::<T>)
        .transpose()
        .map_err(ApiError::from)
}
