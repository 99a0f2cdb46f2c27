//! Config source port: the host's structured-config reader.

use cellhub_domain::error::ConfigError;

/// Resolves a path-like reference to a parsed configuration value.
pub trait ConfigSource: Send + Sync {
    /// Read and parse the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    fn read(&self, path: &str) -> Result<serde_json::Value, ConfigError>;
}

impl<T: ConfigSource> ConfigSource for std::sync::Arc<T> {
    fn read(&self, path: &str) -> Result<serde_json::Value, ConfigError> {
        (**self).read(path)
    }
}
