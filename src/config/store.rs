//! Durable storage for the service map document.
//!
//! Writes land in a sibling temporary file which is then renamed over the
//! document, so a concurrent reader sees either the old or the new content
//! and never a truncated file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::config::loader::ConfigError;
use crate::config::services::ServiceMap;

/// Loads and saves the JSON service map at a fixed path.
#[derive(Debug, Clone)]
pub struct ServiceConfigStore {
    path: PathBuf,
}

impl ServiceConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the document path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the service map.
    ///
    /// A missing document is not an error: the built-in default map is
    /// written and returned instead.
    pub fn load(&self) -> Result<ServiceMap, ConfigError> {
        if !self.path.exists() {
            tracing::info!(
                path = %self.path.display(),
                "Service map not found, writing built-in default"
            );
            let document = ServiceMap::builtin_default();
            self.save(&document)?;
            return Ok(document);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| ConfigError::ReadError {
            path: self.path.clone(),
            source: e,
        })?;

        let document: ServiceMap =
            serde_json::from_str(&content).map_err(|e| ConfigError::DocumentParseError {
                path: self.path.clone(),
                source: e,
            })?;

        tracing::info!(
            path = %self.path.display(),
            services = document.len(),
            "Service map loaded"
        );
        Ok(document)
    }

    /// Persist the service map atomically.
    pub fn save(&self, document: &ServiceMap) -> Result<(), ConfigError> {
        let data = serde_json::to_vec_pretty(document).map_err(ConfigError::SerializeError)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.write_error(parent, e))?;
            }
        }

        // Held until the end of this call; closing the file releases it.
        let lock_path = self.sibling("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| self.write_error(&lock_path, e))?;
        FileExt::lock_exclusive(&lock_file).map_err(|e| self.write_error(&lock_path, e))?;

        let tmp_path = self.sibling("tmp");
        let cleanup = scopeguard::guard(tmp_path.clone(), |path| {
            let _ = fs::remove_file(path);
        });

        write_synced(&tmp_path, &data).map_err(|e| self.write_error(&tmp_path, e))?;

        fs::rename(&tmp_path, &self.path).map_err(|e| self.write_error(&self.path, e))?;
        scopeguard::ScopeGuard::into_inner(cleanup);

        tracing::debug!(path = %self.path.display(), "Service map saved");
        Ok(())
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }

    fn write_error(&self, path: &Path, source: std::io::Error) -> ConfigError {
        ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.write_all(b"\n")?;
    file.sync_all()
}
