//! Service registry with blue/green hot-swap routing.
//!
//! Provides thread-safe registry state with support for runtime switching
//! without interrupting in-flight requests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use thiserror::Error;

use crate::backend::dialer::{BackendDialer, DialError, ForwardingClient};
use crate::config::{ConfigError, Environment, ServiceConfigStore, ServiceMap, ServiceRecord};
use crate::proxy::routing::{resolve_route, RouteMatch};

/// Switch history kept in memory for status reporting.
const SWITCH_LOG_CAPACITY: usize = 256;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Malformed input: bad id, empty document, empty target.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// A target URL could not be turned into a forwarding client.
    #[error("Service '{service}' has an invalid {env} target: {source}")]
    InvalidTarget {
        service: String,
        env: Environment,
        #[source]
        source: DialError,
    },

    #[error("Service '{service}' not found")]
    NotFound { service: String },

    #[error("Service '{service}' already exists")]
    AlreadyExists { service: String },

    #[error("Cannot remove '{service}': at least one service must remain")]
    LastService { service: String },

    /// The initial service map could not be loaded.
    #[error("Failed to load service map: {0}")]
    Load(#[source] ConfigError),

    /// The change is live in memory but could not be written to disk.
    #[error("Change applied in memory but not persisted: {0}")]
    Persist(#[source] ConfigError),
}

/// Log entry for an environment switch.
#[derive(Debug, Clone)]
pub struct SwitchLogEntry {
    /// When the switch occurred.
    pub timestamp: SystemTime,
    pub service: String,
    pub old_env: Environment,
    pub new_env: Environment,
}

/// Everything a request needs once its service is resolved.
///
/// Owns an `Arc` to the forwarding client, so forwarding continues to work
/// even if the service is removed or replaced meanwhile.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub service_id: String,
    pub env: Environment,
    pub matched: RouteMatch,
    /// Rewritten path, without query string.
    pub path: String,
    pub client: Arc<ForwardingClient>,
}

struct ClientPair {
    blue: Arc<ForwardingClient>,
    green: Arc<ForwardingClient>,
}

impl ClientPair {
    fn get(&self, env: Environment) -> &Arc<ForwardingClient> {
        match env {
            Environment::Blue => &self.blue,
            Environment::Green => &self.green,
        }
    }
}

struct ServiceEntry {
    record: ServiceRecord,
    clients: ClientPair,
}

struct Registry {
    services: BTreeMap<String, ServiceEntry>,
    switch_log: VecDeque<SwitchLogEntry>,
}

impl Registry {
    fn document(&self) -> ServiceMap {
        ServiceMap {
            services: self
                .services
                .iter()
                .map(|(id, entry)| (id.clone(), entry.record.clone()))
                .collect(),
        }
    }

    fn record_switch(&mut self, service: &str, old_env: Environment, new_env: Environment) {
        if old_env == new_env {
            return;
        }
        if self.switch_log.len() == SWITCH_LOG_CAPACITY {
            self.switch_log.pop_front();
        }
        self.switch_log.push_back(SwitchLogEntry {
            timestamp: SystemTime::now(),
            service: service.to_string(),
            old_env,
            new_env,
        });
    }
}

/// Thread-safe service registry and dispatcher.
///
/// Uses a read-write lock: many concurrent requests resolve their target
/// under the read lock, while mutations hold the write lock for their whole
/// duration, persistence included. Clones share the same registry.
#[derive(Clone)]
pub struct ServiceRouter {
    inner: Arc<RwLock<Registry>>,
    store: ServiceConfigStore,
    dialer: BackendDialer,
}

impl ServiceRouter {
    /// Load the service map from `store` and build every forwarding client.
    ///
    /// # Errors
    /// Returns error if the document can't be read or parsed, or if any
    /// record fails validation.
    pub fn load(store: ServiceConfigStore, dialer: BackendDialer) -> Result<Self, RegistryError> {
        let document = store.load().map_err(RegistryError::Load)?;
        Self::from_document(document, store, dialer)
    }

    /// Build a router from an in-memory document without persisting it.
    pub fn from_document(
        document: ServiceMap,
        store: ServiceConfigStore,
        dialer: BackendDialer,
    ) -> Result<Self, RegistryError> {
        let services = build_entries(document, &dialer)?;

        for (id, entry) in &services {
            tracing::info!(
                service = %id,
                name = %entry.record.display_name(id),
                blue = %entry.record.blue_target,
                green = %entry.record.green_target,
                active = %entry.record.active_env,
                "Service initialised"
            );
        }
        tracing::info!(services = services.len(), "Service registry ready");

        Ok(Self {
            inner: Arc::new(RwLock::new(Registry {
                services,
                switch_log: VecDeque::new(),
            })),
            store,
            dialer,
        })
    }

    /// Resolve a request path to its service, environment and client.
    ///
    /// The record and client are read under one lock acquisition, so the
    /// returned environment and client always belong together. Returns
    /// `None` only when the registry is empty.
    pub fn resolve(&self, path: &str) -> Option<Dispatch> {
        let registry = self.inner.read();
        let route = resolve_route(
            path,
            |id| registry.services.contains_key(id),
            || registry.services.keys().next().cloned(),
        )?;
        let entry = registry.services.get(&route.service_id)?;
        let env = entry.record.active_env;

        Some(Dispatch {
            client: entry.clients.get(env).clone(),
            env,
            matched: route.matched,
            path: route.path,
            service_id: route.service_id,
        })
    }

    /// Snapshot of the current service map.
    pub fn get_config(&self) -> ServiceMap {
        self.inner.read().document()
    }

    /// Get one record by id.
    pub fn service(&self, id: &str) -> Option<ServiceRecord> {
        self.inner
            .read()
            .services
            .get(id)
            .map(|entry| entry.record.clone())
    }

    /// Sorted list of service ids.
    pub fn service_ids(&self) -> Vec<String> {
        self.inner.read().services.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().services.is_empty()
    }

    /// Get the switch log for debugging/auditing.
    pub fn switch_log(&self) -> Vec<SwitchLogEntry> {
        self.inner.read().switch_log.iter().cloned().collect()
    }

    pub fn store(&self) -> &ServiceConfigStore {
        &self.store
    }

    /// Point one service at `env` and persist.
    ///
    /// Both clients already exist, so nothing is rebuilt. Returns the
    /// previous environment.
    ///
    /// # Errors
    /// `NotFound` leaves everything untouched. `Persist` means the switch is
    /// live but not yet on disk.
    pub fn switch_service(&self, id: &str, env: Environment) -> Result<Environment, RegistryError> {
        let mut registry = self.inner.write();

        let entry = registry
            .services
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound {
                service: id.to_string(),
            })?;
        let old_env = entry.record.active_env;
        entry.record.active_env = env;
        registry.record_switch(id, old_env, env);

        tracing::info!(service = %id, old_env = %old_env, new_env = %env, "Service switched");

        self.persist_locked(&registry)?;
        Ok(old_env)
    }

    /// Point every service at `env` and persist once.
    ///
    /// Returns the number of services now on `env`.
    pub fn switch_all(&self, env: Environment) -> Result<usize, RegistryError> {
        let mut registry = self.inner.write();

        let changes: Vec<(String, Environment)> = registry
            .services
            .iter_mut()
            .map(|(id, entry)| {
                let old_env = entry.record.active_env;
                entry.record.active_env = env;
                (id.clone(), old_env)
            })
            .collect();
        for (id, old_env) in &changes {
            registry.record_switch(id, *old_env, env);
        }

        tracing::info!(services = changes.len(), new_env = %env, "All services switched");

        self.persist_locked(&registry)?;
        Ok(changes.len())
    }

    /// Register a new service and persist.
    ///
    /// Both clients are built before the record becomes visible, so a
    /// failure leaves no trace in the registry.
    pub fn add_service(&self, id: &str, record: ServiceRecord) -> Result<(), RegistryError> {
        validate_id(id)?;

        let mut registry = self.inner.write();
        if registry.services.contains_key(id) {
            return Err(RegistryError::AlreadyExists {
                service: id.to_string(),
            });
        }

        let entry = build_entry(id, record, &self.dialer)?;
        tracing::info!(
            service = %id,
            name = %entry.record.display_name(id),
            blue = %entry.record.blue_target,
            green = %entry.record.green_target,
            "Service added"
        );
        registry.services.insert(id.to_string(), entry);

        self.persist_locked(&registry)
    }

    /// Remove a service and its clients, then persist.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, `LastService` when `id` is the only
    /// remaining service. Both leave the registry unchanged.
    pub fn remove_service(&self, id: &str) -> Result<(), RegistryError> {
        let mut registry = self.inner.write();

        if !registry.services.contains_key(id) {
            return Err(RegistryError::NotFound {
                service: id.to_string(),
            });
        }
        if registry.services.len() <= 1 {
            return Err(RegistryError::LastService {
                service: id.to_string(),
            });
        }

        registry.services.remove(id);
        tracing::info!(service = %id, remaining = registry.services.len(), "Service removed");

        self.persist_locked(&registry)
    }

    /// Replace the whole registry with `document` and persist.
    ///
    /// Every client is built up front; on any failure the current registry
    /// stays in place. Returns the number of services now registered.
    pub fn update_config(&self, document: ServiceMap) -> Result<usize, RegistryError> {
        let services = build_entries(document, &self.dialer)?;
        let count = services.len();

        let mut registry = self.inner.write();
        registry.services = services;
        tracing::info!(services = count, "Service registry replaced");

        self.persist_locked(&registry)?;
        Ok(count)
    }

    /// Write the current in-memory state to disk.
    ///
    /// Used to retry after a mutation reported `Persist`.
    pub fn persist(&self) -> Result<(), RegistryError> {
        let registry = self.inner.write();
        self.persist_locked(&registry)
    }

    fn persist_locked(&self, registry: &Registry) -> Result<(), RegistryError> {
        self.store.save(&registry.document()).map_err(|e| {
            tracing::error!(
                path = %self.store.path().display(),
                error = %e,
                "Failed to persist service map"
            );
            RegistryError::Persist(e)
        })
    }
}

/// Ids become a single path segment, so only unreserved characters are
/// accepted.
fn validate_id(id: &str) -> Result<(), RegistryError> {
    if id.is_empty() {
        return Err(RegistryError::Validation {
            message: "service id must not be empty".to_string(),
        });
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        || id == "."
        || id == ".."
    {
        return Err(RegistryError::Validation {
            message: format!(
                "service id '{id}' may only contain ASCII letters, digits, '-', '_' and '.'"
            ),
        });
    }
    Ok(())
}

fn build_entries(
    document: ServiceMap,
    dialer: &BackendDialer,
) -> Result<BTreeMap<String, ServiceEntry>, RegistryError> {
    if document.is_empty() {
        return Err(RegistryError::Validation {
            message: "at least one service must be configured".to_string(),
        });
    }

    document
        .services
        .into_iter()
        .map(|(id, record)| {
            validate_id(&id)?;
            let entry = build_entry(&id, record, dialer)?;
            Ok((id, entry))
        })
        .collect()
}

fn build_entry(
    id: &str,
    record: ServiceRecord,
    dialer: &BackendDialer,
) -> Result<ServiceEntry, RegistryError> {
    let dial = |env: Environment| {
        dialer
            .build(record.target(env))
            .map(Arc::new)
            .map_err(|source| RegistryError::InvalidTarget {
                service: id.to_string(),
                env,
                source,
            })
    };
    let clients = ClientPair {
        blue: dial(Environment::Blue)?,
        green: dial(Environment::Green)?,
    };

    Ok(ServiceEntry { record, clients })
}
