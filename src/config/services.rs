//! The service map document: one typed record per logical service.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Id of the service that receives traffic no path prefix claims.
pub const DEFAULT_SERVICE_ID: &str = "default";

/// One of the two deployable pools of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Blue,
    Green,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Blue => "blue",
            Environment::Green => "green",
        }
    }

    /// The pool that is not `self`.
    pub fn other(&self) -> Environment {
        match self {
            Environment::Blue => Environment::Green,
            Environment::Green => Environment::Blue,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid environment '{0}', expected 'blue' or 'green'")]
pub struct InvalidEnvironment(pub String);

impl FromStr for Environment {
    type Err = InvalidEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blue" => Ok(Environment::Blue),
            "green" => Ok(Environment::Green),
            other => Err(InvalidEnvironment(other.to_string())),
        }
    }
}

/// Routing facts for one logical service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Display name. Empty means "use the id".
    #[serde(default)]
    pub name: String,
    /// Base URL of the blue pool.
    pub blue_target: String,
    /// Base URL of the green pool.
    pub green_target: String,
    /// Pool currently receiving traffic.
    pub active_env: Environment,
    /// Deployment artifact pattern, used only by external process tooling.
    #[serde(default)]
    pub jar_file: String,
    /// Application name, used only by external process tooling.
    #[serde(default)]
    pub app_name: String,
}

impl ServiceRecord {
    pub fn target(&self, env: Environment) -> &str {
        match env {
            Environment::Blue => &self.blue_target,
            Environment::Green => &self.green_target,
        }
    }

    pub fn active_target(&self) -> &str {
        self.target(self.active_env)
    }

    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        if self.name.is_empty() {
            id
        } else {
            &self.name
        }
    }
}

/// The persisted document: service id to record.
///
/// A sorted map keeps serialization stable, so saving a loaded document
/// reproduces it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMap {
    #[serde(default)]
    pub services: BTreeMap<String, ServiceRecord>,
}

impl ServiceMap {
    /// The document written when no service map exists yet.
    pub fn builtin_default() -> Self {
        let mut services = BTreeMap::new();
        services.insert(
            DEFAULT_SERVICE_ID.to_string(),
            ServiceRecord {
                name: "Default service".to_string(),
                blue_target: "http://127.0.0.1:8080".to_string(),
                green_target: "http://127.0.0.1:8081".to_string(),
                active_env: Environment::Blue,
                jar_file: "app-*.jar".to_string(),
                app_name: "app".to_string(),
            },
        );
        Self { services }
    }

    pub fn get(&self, id: &str) -> Option<&ServiceRecord> {
        self.services.get(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_lowercase_only() {
        assert_eq!("blue".parse::<Environment>().unwrap(), Environment::Blue);
        assert_eq!("green".parse::<Environment>().unwrap(), Environment::Green);
        assert!("Green".parse::<Environment>().is_err());
        assert!("".parse::<Environment>().is_err());
    }

    #[test]
    fn environment_other() {
        assert_eq!(Environment::Blue.other(), Environment::Green);
        assert_eq!(Environment::Green.other(), Environment::Blue);
    }

    #[test]
    fn record_missing_selectors_default_to_empty() {
        let record: ServiceRecord = serde_json::from_str(
            r#"{"blue_target":"http://a","green_target":"http://b","active_env":"green"}"#,
        )
        .unwrap();
        assert_eq!(record.active_env, Environment::Green);
        assert_eq!(record.active_target(), "http://b");
        assert!(record.jar_file.is_empty());
        assert_eq!(record.display_name("svc"), "svc");
    }

    #[test]
    fn unknown_active_env_is_rejected() {
        let result: Result<ServiceRecord, _> = serde_json::from_str(
            r#"{"blue_target":"http://a","green_target":"http://b","active_env":"red"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn builtin_default_has_default_service() {
        let map = ServiceMap::builtin_default();
        assert_eq!(map.len(), 1);
        let record = map.get(DEFAULT_SERVICE_ID).unwrap();
        assert_eq!(record.active_env, Environment::Blue);
        assert_ne!(record.blue_target, record.green_target);
    }
}
