//! Typed HTTP client for the garrison controller REST API.

use anyhow::{bail, Context, Result};
use reqwest::Client;

use crate::api::rest::{
    CheckinRequest, CheckinResponse, ControllerHealth, CreateHostRequest, CreateProfileRequest,
    CreateServerRequest, CreateWorkRequest, PurgeResult, StateReportRequest, StatusUpdateRequest,
};
use crate::domain::queue::QueueCounts;
use crate::domain::types::{ConnectivityState, GameProfile, GameServer, Host, LocalResource};
use crate::domain::work::{TargetBand, WorkItem, WorkStatus};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:9400";

#[derive(Clone)]
pub struct GarrisonClient {
    base_url: String,
    http: Client,
}

impl GarrisonClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub async fn health(&self) -> Result<ControllerHealth> {
        self.get("/health").await
    }

    // ── Queue ──────────────────────────────────────────────

    pub async fn create_work(&self, req: &CreateWorkRequest) -> Result<WorkItem> {
        self.post("/api/v1/work", req).await
    }

    pub async fn work(&self, id: u64) -> Result<WorkItem> {
        self.get(&format!("/api/v1/work/{}", id)).await
    }

    pub async fn update_work_status(&self, id: u64, status: WorkStatus) -> Result<WorkItem> {
        self.post(
            &format!("/api/v1/work/{}/status", id),
            &StatusUpdateRequest { status },
        )
        .await
    }

    pub async fn work_counts(&self, band: TargetBand) -> Result<QueueCounts> {
        self.get(&format!("/api/v1/work/counts?band={}", band)).await
    }

    pub async fn work_in_progress(&self, band: TargetBand) -> Result<Vec<WorkItem>> {
        self.get(&format!("/api/v1/work/in-progress?band={}", band))
            .await
    }

    pub async fn next_waiting(&self, band: TargetBand) -> Result<Option<WorkItem>> {
        self.get(&format!("/api/v1/work/next?band={}", band)).await
    }

    pub async fn purge(&self) -> Result<PurgeResult> {
        self.post("/api/v1/work/purge", &()).await
    }

    // ── Fleet ──────────────────────────────────────────────

    pub async fn checkin(&self, req: &CheckinRequest) -> Result<CheckinResponse> {
        self.post("/api/v1/checkin", req).await
    }

    pub async fn hosts(&self) -> Result<Vec<Host>> {
        self.get("/api/v1/hosts").await
    }

    pub async fn create_host(&self, name: &str, address: &str) -> Result<Host> {
        self.post(
            "/api/v1/hosts",
            &CreateHostRequest {
                name: name.to_string(),
                address: address.to_string(),
            },
        )
        .await
    }

    /// The agent's pull: first waiting item for this host in the band.
    pub async fn next_work_for_host(
        &self,
        host_id: u64,
        band: TargetBand,
    ) -> Result<Option<WorkItem>> {
        self.get(&format!("/api/v1/hosts/{}/work/next?band={}", host_id, band))
            .await
    }

    pub async fn servers(&self) -> Result<Vec<GameServer>> {
        self.get("/api/v1/servers").await
    }

    pub async fn server(&self, id: u64) -> Result<GameServer> {
        self.get(&format!("/api/v1/servers/{}", id)).await
    }

    pub async fn create_server(&self, req: &CreateServerRequest) -> Result<GameServer> {
        self.post("/api/v1/servers", req).await
    }

    pub async fn report_server_state(
        &self,
        id: u64,
        state: ConnectivityState,
    ) -> Result<GameServer> {
        self.post(
            &format!("/api/v1/servers/{}/state", id),
            &StateReportRequest { state },
        )
        .await
    }

    pub async fn server_resources(&self, id: u64) -> Result<Vec<LocalResource>> {
        self.get(&format!("/api/v1/servers/{}/resources", id)).await
    }

    pub async fn create_profile(&self, req: &CreateProfileRequest) -> Result<GameProfile> {
        self.post("/api/v1/profiles", req).await
    }

    // ── Internal helpers ───────────────────────────────────

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        if !resp.status().is_success() {
            bail!("{} returned {}", url, resp.status());
        }

        resp.json()
            .await
            .with_context(|| format!("parsing response from {}", url))
    }

    async fn post<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;

        if !resp.status().is_success() {
            bail!("{} returned {}", url, resp.status());
        }

        resp.json()
            .await
            .with_context(|| format!("parsing response from {}", url))
    }
}
