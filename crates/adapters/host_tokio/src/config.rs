//! JSON configuration files on disk.

use std::path::{Path, PathBuf};

use cellhub_domain::error::ConfigError;
use cellhub_engine::ports::ConfigSource;
use tracing::debug;

/// Reads JSON configuration files relative to a root directory.
pub struct JsonConfigSource {
    root: PathBuf,
}

impl JsonConfigSource {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        }
    }
}

impl ConfigSource for JsonConfigSource {
    fn read(&self, path: &str) -> Result<serde_json::Value, ConfigError> {
        let path = self.resolve(path);
        debug!(path = %path.display(), "reading configuration");
        let bytes = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
