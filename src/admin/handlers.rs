//! Management endpoint handlers.

use std::collections::BTreeMap;
use std::time::SystemTime;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::admin::error::AdminError;
use crate::admin::health::ServiceHealth;
use crate::admin::AdminState;
use crate::backend::{RegistryError, ServiceRouter, SwitchLogEntry};
use crate::config::{Environment, ServiceMap, ServiceRecord};

/// Number of switch log entries included in `/status`.
const RECENT_SWITCHES: usize = 20;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn now() -> String {
    Local::now().format(TIME_FORMAT).to_string()
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format(TIME_FORMAT).to_string()
}

/// Run a registry mutation on the blocking pool.
///
/// Mutations hold the registry write lock until the services file is synced
/// to disk; neither may happen on an async worker.
async fn mutate<T, F>(router: &ServiceRouter, op: F) -> Result<T, AdminError>
where
    F: FnOnce(&ServiceRouter) -> Result<T, RegistryError> + Send + 'static,
    T: Send + 'static,
{
    let router = router.clone();
    let result = tokio::task::spawn_blocking(move || op(&router)).await?;
    Ok(result?)
}

#[derive(Debug, Deserialize)]
pub struct ServiceQuery {
    pub service: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SwitchQuery {
    pub env: Option<String>,
    pub service: Option<String>,
}

/// Body of `POST /services`.
#[derive(Debug, Deserialize)]
pub struct AddServiceRequest {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub blue_target: String,
    pub green_target: String,
    #[serde(default)]
    pub jar_file: String,
    #[serde(default)]
    pub app_name: String,
}

impl AddServiceRequest {
    /// The record to register. New services always start on blue.
    fn into_record(self) -> (String, ServiceRecord) {
        let name = if self.name.is_empty() {
            self.id.clone()
        } else {
            self.name
        };
        let app_name = if self.app_name.is_empty() {
            self.id.clone()
        } else {
            self.app_name
        };

        let record = ServiceRecord {
            name,
            blue_target: self.blue_target,
            green_target: self.green_target,
            active_env: Environment::Blue,
            jar_file: self.jar_file,
            app_name,
        };
        (self.id, record)
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub id: String,
    pub name: String,
    pub active_env: Environment,
    pub active_target: String,
    pub blue_target: String,
    pub green_target: String,
    pub jar_file: String,
    pub app_name: String,
}

impl ServiceStatus {
    fn new(id: &str, record: &ServiceRecord) -> Self {
        Self {
            id: id.to_string(),
            name: record.display_name(id).to_string(),
            active_env: record.active_env,
            active_target: record.active_target().to_string(),
            blue_target: record.blue_target.clone(),
            green_target: record.green_target.clone(),
            jar_file: record.jar_file.clone(),
            app_name: record.app_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SwitchRecord {
    pub time: String,
    pub service: String,
    pub old_env: Environment,
    pub new_env: Environment,
}

impl From<&SwitchLogEntry> for SwitchRecord {
    fn from(entry: &SwitchLogEntry) -> Self {
        Self {
            time: format_time(entry.timestamp),
            service: entry.service.clone(),
            old_env: entry.old_env,
            new_env: entry.new_env,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GatewayStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub service_count: usize,
    pub services: Vec<ServiceStatus>,
    pub proxy_addr: String,
    pub admin_addr: String,
    pub services_file: String,
    pub open_connections: usize,
    pub recent_switches: Vec<SwitchRecord>,
    pub started_at: String,
    pub time: String,
}

/// `GET /status[?service=id]`
pub async fn status(
    State(state): State<AdminState>,
    query: Result<Query<ServiceQuery>, QueryRejection>,
) -> Result<Response, AdminError> {
    let Query(query) = query.map_err(|e| AdminError::BadRequest(e.body_text()))?;

    if let Some(id) = query.service.filter(|id| !id.is_empty()) {
        let record = state
            .router
            .service(&id)
            .ok_or_else(|| AdminError::ServiceNotFound(id.clone()))?;
        return Ok(Json(json!({
            "service_id": id,
            "name": record.display_name(&id),
            "active_env": record.active_env,
            "active_target": record.active_target(),
            "blue_target": record.blue_target,
            "green_target": record.green_target,
            "time": now(),
        }))
        .into_response());
    }

    let document = state.router.get_config();
    let services: Vec<ServiceStatus> = document
        .services
        .iter()
        .map(|(id, record)| ServiceStatus::new(id, record))
        .collect();

    let log = state.router.switch_log();
    let recent_switches = log
        .iter()
        .rev()
        .take(RECENT_SWITCHES)
        .map(SwitchRecord::from)
        .collect();

    let status = GatewayStatus {
        status: "running",
        version: env!("CARGO_PKG_VERSION"),
        service_count: services.len(),
        services,
        proxy_addr: state.proxy_addr.to_string(),
        admin_addr: state.admin_addr.to_string(),
        services_file: state.router.store().path().display().to_string(),
        open_connections: state.shutdown.active_connections(),
        recent_switches,
        started_at: state.started_at.format(TIME_FORMAT).to_string(),
        time: now(),
    };

    Ok(Json(status).into_response())
}

/// `POST /switch?env=blue|green[&service=id]`
pub async fn switch(
    State(state): State<AdminState>,
    query: Result<Query<SwitchQuery>, QueryRejection>,
) -> Result<Json<Value>, AdminError> {
    let Query(query) = query.map_err(|e| AdminError::BadRequest(e.body_text()))?;

    let env: Environment = query
        .env
        .as_deref()
        .unwrap_or_default()
        .parse()
        .map_err(|e: crate::config::InvalidEnvironment| AdminError::BadRequest(e.to_string()))?;

    match query.service.filter(|id| !id.is_empty()) {
        Some(id) => {
            let old_env = {
                let id = id.clone();
                mutate(&state.router, move |router| router.switch_service(&id, env)).await?
            };
            Ok(Json(json!({
                "success": true,
                "message": format!("Service '{id}' switched from {old_env} to {env}"),
                "service_id": id,
                "old_env": old_env,
                "new_env": env,
                "time": now(),
            })))
        }
        None => {
            let count = mutate(&state.router, move |router| router.switch_all(env)).await?;
            Ok(Json(json!({
                "success": true,
                "message": format!("All services ({count}) switched to {env}"),
                "new_env": env,
                "service_count": count,
                "time": now(),
            })))
        }
    }
}

/// `POST /config`
pub async fn update_config(
    State(state): State<AdminState>,
    body: Result<Json<ServiceMap>, JsonRejection>,
) -> Result<Json<Value>, AdminError> {
    let Json(document) = body.map_err(|e| AdminError::BadRequest(e.body_text()))?;
    let count = mutate(&state.router, move |router| router.update_config(document)).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Configuration updated",
        "service_count": count,
        "time": now(),
    })))
}

/// `POST /config/save`
pub async fn save_config(State(state): State<AdminState>) -> Result<Json<Value>, AdminError> {
    mutate(&state.router, |router| router.persist()).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Configuration saved",
        "path": state.router.store().path().display().to_string(),
        "time": now(),
    })))
}

/// `GET /services`
pub async fn list_services(State(state): State<AdminState>) -> Json<Value> {
    let services = state.router.service_ids();
    Json(json!({
        "count": services.len(),
        "services": services,
    }))
}

/// `POST /services`
pub async fn add_service(
    State(state): State<AdminState>,
    body: Result<Json<AddServiceRequest>, JsonRejection>,
) -> Result<Json<Value>, AdminError> {
    let Json(request) = body.map_err(|e| AdminError::BadRequest(e.body_text()))?;
    let (id, record) = request.into_record();
    {
        let id = id.clone();
        mutate(&state.router, move |router| router.add_service(&id, record)).await?;
    }

    Ok(Json(json!({
        "success": true,
        "message": format!("Service '{id}' added"),
        "service_id": id,
    })))
}

/// `DELETE /services/{id}`
pub async fn remove_service(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AdminError> {
    {
        let id = id.clone();
        mutate(&state.router, move |router| router.remove_service(&id)).await?;
    }

    Ok(Json(json!({
        "success": true,
        "message": format!("Service '{id}' removed"),
        "service_id": id,
    })))
}

/// `GET /health`
pub async fn health() -> &'static str {
    "OK"
}

/// `GET /health/services`
pub async fn health_all(
    State(state): State<AdminState>,
) -> Json<BTreeMap<String, ServiceHealth>> {
    Json(state.health.check_all(state.router.get_config()).await)
}

/// `GET /health/services/{id}`
pub async fn health_one(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<ServiceHealth>, AdminError> {
    let record = state
        .router
        .service(&id)
        .ok_or_else(|| AdminError::ServiceNotFound(id.clone()))?;
    Ok(Json(state.health.check(&id, &record).await))
}
