use crate::data::{
    EntryPatch, GenerateRequest, GenerationResult, NewEntry, NewPeriod, PeriodKey, PeriodTime,
    Subject, TimetableEntry, TimetableQuery, TimetableView,
};
use crate::error::AppError;
use crate::roles::Role;
use crate::service::TimetableService;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

pub type SharedService = Arc<TimetableService>;

#[derive(Debug, Deserialize)]
pub struct EntryId {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct SubjectFilter {
    pub class: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub message: String,
    pub data: GenerationResult,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub deleted: TimetableEntry,
}

/// Runs a store-backed service call on the blocking pool; SQLite access
/// must not stall the async workers.
async fn blocking<T, F>(service: SharedService, f: F) -> Result<T, AppError>
where
    F: FnOnce(&TimetableService) -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| AppError::Persistence(format!("worker task failed: {}", e)))?
}

async fn list_timetable(
    State(service): State<SharedService>,
    Query(query): Query<TimetableQuery>,
) -> Result<Json<TimetableView>, AppError> {
    let view = blocking(service, move |service| service.query(&query)).await?;
    Ok(Json(view))
}

async fn create_entry(
    State(service): State<SharedService>,
    headers: HeaderMap,
    Json(entry): Json<NewEntry>,
) -> Result<(StatusCode, Json<TimetableEntry>), AppError> {
    Role::require_manager(&headers)?;
    let created = blocking(service, move |service| service.create_entry(&entry)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_entry(
    State(service): State<SharedService>,
    headers: HeaderMap,
    Query(EntryId { id }): Query<EntryId>,
    Json(patch): Json<EntryPatch>,
) -> Result<Json<TimetableEntry>, AppError> {
    Role::require_manager(&headers)?;
    let updated = blocking(service, move |service| service.update_entry(&id, &patch)).await?;
    Ok(Json(updated))
}

async fn delete_entry(
    State(service): State<SharedService>,
    headers: HeaderMap,
    Query(EntryId { id }): Query<EntryId>,
) -> Result<Json<DeleteResponse>, AppError> {
    Role::require_manager(&headers)?;
    let deleted = blocking(service, move |service| service.delete_entry(&id)).await?;
    Ok(Json(DeleteResponse {
        success: true,
        deleted,
    }))
}

async fn generate_timetable(
    State(service): State<SharedService>,
    headers: HeaderMap,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    let role = Role::require_manager(&headers)?;
    info!(
        "{:?} requested generation for '{}' (overwrite={})",
        role, request.class_name, request.overwrite
    );
    let class_name = request.class_name.trim().to_string();
    let data = blocking(service, move |service| service.generate(&request)).await?;
    Ok(Json(GenerateResponse {
        success: true,
        message: format!("Generated {} periods for {}", data.total_periods, class_name),
        data,
    }))
}

async fn list_subjects(
    State(service): State<SharedService>,
    Query(filter): Query<SubjectFilter>,
) -> Result<Json<Vec<Subject>>, AppError> {
    let subjects = blocking(service, move |service| service.subjects(filter.class.as_deref())).await?;
    Ok(Json(subjects))
}

async fn list_classes(State(service): State<SharedService>) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(blocking(service, |service| service.classes()).await?))
}

async fn list_periods(
    State(service): State<SharedService>,
) -> Result<Json<BTreeMap<PeriodKey, PeriodTime>>, AppError> {
    Ok(Json(blocking(service, |service| service.periods()).await?))
}

async fn add_period(
    State(service): State<SharedService>,
    headers: HeaderMap,
    Json(period): Json<NewPeriod>,
) -> Result<(StatusCode, Json<BTreeMap<PeriodKey, PeriodTime>>), AppError> {
    Role::require_manager(&headers)?;
    let periods = blocking(service, move |service| service.add_period(&period)).await?;
    Ok((StatusCode::CREATED, Json(periods)))
}

async fn health() -> &'static str {
    "ok"
}

pub fn router(service: SharedService) -> Router {
    Router::new()
        .route(
            "/api/timetable",
            get(list_timetable)
                .post(create_entry)
                .put(update_entry)
                .delete(delete_entry),
        )
        .route("/api/timetable/generate", post(generate_timetable))
        .route("/api/subjects", get(list_subjects))
        .route("/api/classes", get(list_classes))
        .route("/api/periods", get(list_periods).post(add_period))
        .route("/health", get(health))
        .with_state(service)
}

pub async fn run_server(addr: SocketAddr, service: SharedService) -> std::io::Result<()> {
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app).await
}
