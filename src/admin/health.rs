//! Health probing of each service's active backend.

use std::collections::BTreeMap;

use reqwest::Client;
use serde::Serialize;
use tokio::task::JoinSet;

use crate::config::{Environment, HealthConfig, ServiceMap, ServiceRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Probe result for one service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub service_id: String,
    pub name: String,
    pub active_env: Environment,
    pub target: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Sends a GET to `<active target><health path>` with a short timeout.
///
/// Any HTTP response counts as healthy: the backend process is up and
/// answering. Connection failures and timeouts count as unhealthy.
#[derive(Clone)]
pub struct HealthProbe {
    client: Client,
    path: String,
}

impl HealthProbe {
    pub fn new(config: &HealthConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            path: config.path.clone(),
        })
    }

    pub fn url_for(&self, target: &str) -> String {
        format!("{}{}", target.trim_end_matches('/'), self.path)
    }

    /// Probe one service's active target.
    pub async fn check(&self, id: &str, record: &ServiceRecord) -> ServiceHealth {
        let target = record.active_target().to_string();
        let url = self.url_for(&target);

        let (status, http_status, error) = match self.client.get(&url).send().await {
            Ok(resp) => (HealthStatus::Healthy, Some(resp.status().as_u16()), None),
            Err(e) => {
                tracing::debug!(service = %id, url = %url, error = %e, "Health probe failed");
                (HealthStatus::Unhealthy, None, Some(e.to_string()))
            }
        };

        ServiceHealth {
            service_id: id.to_string(),
            name: record.display_name(id).to_string(),
            active_env: record.active_env,
            target,
            status,
            http_status,
            error,
        }
    }

    /// Probe every service concurrently.
    pub async fn check_all(&self, document: ServiceMap) -> BTreeMap<String, ServiceHealth> {
        let mut probes = JoinSet::new();
        for (id, record) in document.services {
            let probe = self.clone();
            probes.spawn(async move { probe.check(&id, &record).await });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(health) => {
                    results.insert(health.service_id.clone(), health);
                }
                Err(e) => tracing::warn!(error = %e, "Health probe task failed"),
            }
        }
        results
    }
}
