//! REST surface of the control plane.
//!
//! Everything an agent or the CLI needs: the queue contract, the fleet
//! registry, and agent check-in. Handlers are thin; domain errors map to
//! `(StatusCode, String)` responses.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::domain::fleet::{FleetRegistry, RegistryError};
use crate::domain::queue::{QueueCounts, QueueError, WorkQueue};
use crate::domain::types::{
    ConnectivityState, GameProfile, GameServer, Host, LocalResource, ServerObservation,
};
use crate::domain::work::{TargetBand, TargetType, WorkItem, WorkStatus};

/// Shared application state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<WorkQueue>,
    pub fleet: Arc<FleetRegistry>,
    pub started: Instant,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Queue
        .route("/api/v1/work", post(create_work))
        .route("/api/v1/work/{id}", get(get_work))
        .route("/api/v1/work/{id}/status", post(update_work_status))
        .route("/api/v1/work/counts", get(work_counts))
        .route("/api/v1/work/in-progress", get(work_in_progress))
        .route("/api/v1/work/next", get(work_next_waiting))
        .route("/api/v1/work/purge", post(work_purge))
        // Fleet
        .route("/api/v1/checkin", post(checkin))
        .route("/api/v1/hosts", get(list_hosts).post(create_host))
        .route("/api/v1/hosts/{id}", get(get_host))
        .route("/api/v1/hosts/{id}/work/next", get(host_next_work))
        .route("/api/v1/servers", get(list_servers).post(create_server))
        .route("/api/v1/servers/{id}", get(get_server))
        .route("/api/v1/servers/{id}/state", post(report_server_state))
        .route("/api/v1/servers/{id}/resources", get(server_resources))
        .route("/api/v1/profiles", post(create_profile))
        .route("/api/v1/profiles/{id}", get(get_profile))
        .with_state(state)
}

// ── Wire types ─────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ControllerHealth {
    pub version: String,
    pub uptime_secs: u64,
    pub hosts: usize,
    pub servers: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckinRequest {
    pub host_name: String,
    pub agent_version: String,
    #[serde(default)]
    pub observations: Vec<ServerObservation>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckinResponse {
    pub registered: bool,
    pub host_id: Option<u64>,
    #[serde(default)]
    pub servers: Vec<GameServer>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateWorkRequest {
    pub host_id: u64,
    pub game_server_id: Option<u64>,
    pub target_type: TargetType,
    pub work_data: serde_json::Value,
    pub created_by: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: WorkStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StateReportRequest {
    pub state: ConnectivityState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateHostRequest {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateServerRequest {
    pub host_id: u64,
    pub profile_id: u64,
    pub name: String,
    pub install_dir: String,
    pub query_port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateProfileRequest {
    pub name: String,
    pub app_id: Option<String>,
    #[serde(default)]
    pub resources: Vec<LocalResource>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PurgeResult {
    pub removed: usize,
}

#[derive(Debug, Deserialize)]
pub struct BandQuery {
    pub band: TargetBand,
}

// ── Handlers ───────────────────────────────────────────────

type ApiError = (StatusCode, String);

fn queue_error(e: QueueError) -> ApiError {
    let code = match e {
        QueueError::NotFound(_) => StatusCode::NOT_FOUND,
        QueueError::AlreadyExists(_) => StatusCode::CONFLICT,
        QueueError::InvalidTransition { .. } => StatusCode::CONFLICT,
    };
    (code, e.to_string())
}

fn registry_error(e: RegistryError) -> ApiError {
    (StatusCode::NOT_FOUND, e.to_string())
}

async fn health(State(state): State<AppState>) -> Json<ControllerHealth> {
    Json(ControllerHealth {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started.elapsed().as_secs(),
        hosts: state.fleet.list_hosts().await.len(),
        servers: state.fleet.list_servers().await.len(),
    })
}

async fn create_work(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkRequest>,
) -> Result<Json<WorkItem>, ApiError> {
    if state.fleet.get_host(req.host_id).await.is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            format!("host {} not found", req.host_id),
        ));
    }
    let id = state.queue.allocate_id().await;
    let item = WorkItem::new(
        id,
        req.host_id,
        req.game_server_id,
        req.target_type,
        req.work_data,
        req.created_by,
    );
    state.queue.create(item.clone()).await.map_err(queue_error)?;
    Ok(Json(item))
}

async fn get_work(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<WorkItem>, ApiError> {
    state
        .queue
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("work item {} not found", id)))
}

async fn update_work_status(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<Json<WorkItem>, ApiError> {
    state
        .queue
        .update_status(id, req.status)
        .await
        .map(Json)
        .map_err(queue_error)
}

async fn work_counts(
    State(state): State<AppState>,
    Query(q): Query<BandQuery>,
) -> Json<QueueCounts> {
    Json(state.queue.counts(q.band).await)
}

async fn work_in_progress(
    State(state): State<AppState>,
    Query(q): Query<BandQuery>,
) -> Json<Vec<WorkItem>> {
    Json(state.queue.get_in_progress(q.band).await)
}

async fn work_next_waiting(
    State(state): State<AppState>,
    Query(q): Query<BandQuery>,
) -> Json<Option<WorkItem>> {
    Json(state.queue.get_next_waiting(q.band).await)
}

async fn work_purge(State(state): State<AppState>) -> Json<PurgeResult> {
    Json(PurgeResult {
        removed: state.queue.delete_completed().await,
    })
}

async fn checkin(
    State(state): State<AppState>,
    Json(req): Json<CheckinRequest>,
) -> Json<CheckinResponse> {
    match state
        .fleet
        .check_in(&req.host_name, &req.agent_version, req.observations)
        .await
    {
        Some((host, servers)) => Json(CheckinResponse {
            registered: true,
            host_id: Some(host.id),
            servers,
        }),
        None => Json(CheckinResponse {
            registered: false,
            host_id: None,
            servers: Vec::new(),
        }),
    }
}

async fn list_hosts(State(state): State<AppState>) -> Json<Vec<Host>> {
    Json(state.fleet.list_hosts().await)
}

async fn create_host(
    State(state): State<AppState>,
    Json(req): Json<CreateHostRequest>,
) -> Result<Json<Host>, ApiError> {
    if state.fleet.get_host_by_name(&req.name).await.is_some() {
        return Err((
            StatusCode::CONFLICT,
            format!("host '{}' already exists", req.name),
        ));
    }
    Ok(Json(state.fleet.add_host(&req.name, &req.address).await))
}

async fn get_host(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Host>, ApiError> {
    state
        .fleet
        .get_host(id)
        .await
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("host {} not found", id)))
}

/// The agent's pull: first waiting item for this host in the given band.
/// Read-only — the agent reports PickedUp itself once the backpressure
/// check passes.
async fn host_next_work(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(q): Query<BandQuery>,
) -> Json<Option<WorkItem>> {
    Json(state.queue.get_next_waiting_for_host(id, q.band).await)
}

async fn list_servers(State(state): State<AppState>) -> Json<Vec<GameServer>> {
    Json(state.fleet.list_servers().await)
}

async fn create_server(
    State(state): State<AppState>,
    Json(req): Json<CreateServerRequest>,
) -> Result<Json<GameServer>, ApiError> {
    state
        .fleet
        .add_server(
            req.host_id,
            req.profile_id,
            &req.name,
            &req.install_dir,
            req.query_port,
        )
        .await
        .map(Json)
        .map_err(registry_error)
}

async fn get_server(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<GameServer>, ApiError> {
    state
        .fleet
        .get_server(id)
        .await
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("game server {} not found", id)))
}

/// Agents and command handlers report observed state here; the registry
/// stamps `last_state_update` and publishes the change.
async fn report_server_state(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<StateReportRequest>,
) -> Result<Json<GameServer>, ApiError> {
    state
        .fleet
        .update_server_state(id, req.state)
        .await
        .map(Json)
        .map_err(registry_error)
}

async fn server_resources(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<LocalResource>>, ApiError> {
    state
        .fleet
        .resolved_resources(id)
        .await
        .map(Json)
        .map_err(registry_error)
}

async fn create_profile(
    State(state): State<AppState>,
    Json(req): Json<CreateProfileRequest>,
) -> Json<GameProfile> {
    Json(
        state
            .fleet
            .add_profile(&req.name, req.app_id, req.resources)
            .await,
    )
}

async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<GameProfile>, ApiError> {
    state
        .fleet
        .get_profile(id)
        .await
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("profile {} not found", id)))
}
