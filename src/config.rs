//! Configuration structures and utilities

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public origin used in hypermedia links; derived from host and port when unset.
    pub base_url: Option<String>,
    /// Events per page of a raw stream collection
    pub page_size: usize,
    /// Events per single-bucket response
    pub bucket_page_size: usize,
    /// Builders log progress every this many events
    pub progress_interval: u64,
    /// Filter directive used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            base_url: None,
            page_size: 250,
            bucket_page_size: 1000,
            progress_interval: 1000,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load a JSON config file; missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: ServerConfig = serde_json::from_str(&raw).map_err(|e| {
            Error::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be at least 1".to_string()));
        }
        if self.bucket_page_size == 0 {
            return Err(Error::Config("bucket_page_size must be at least 1".to_string()));
        }
        if self.progress_interval == 0 {
            return Err(Error::Config("progress_interval must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn public_base_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| format!("http://{}", self.bind_address()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ServerConfig = serde_json::from_str(r#"{"port": 8080, "page_size": 10}"#).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.bucket_page_size, 1000);
        assert_eq!(config.public_base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        let config = ServerConfig { page_size: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_explicit_base_url_wins() {
        let config =
            ServerConfig { base_url: Some("https://streams.example.org".to_string()), ..Default::default() };
        assert_eq!(config.public_base_url(), "https://streams.example.org");
    }
}
