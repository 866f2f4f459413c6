//! Gateway configuration.
//!
//! Values are layered: built-in defaults, then an optional JSON file, then
//! command-line flags and environment variables applied by the binary.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use mf_ingest::elastic::{DEFAULT_ELASTIC_URL, DEFAULT_REQUEST_TIMEOUT};
use mf_ingest::{ElasticConfig, IngestConfig, PartitionSchema, ProvisionMode};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3040;

/// Default request body limit (10 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Path prefix of the public API.
pub const API_PREFIX: &str = "/v1";

/// Storage backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// In-process store. Records are lost on restart.
    Memory,
    /// Elasticsearch over HTTP.
    Elasticsearch {
        /// Base URL of the cluster.
        #[serde(default = "default_elastic_url")]
        url: String,
        /// Per-request timeout in seconds.
        #[serde(default = "default_request_timeout_secs")]
        request_timeout_secs: u64,
    },
}

fn default_elastic_url() -> String {
    DEFAULT_ELASTIC_URL.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Elasticsearch {
            url: default_elastic_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl BackendConfig {
    /// Elasticsearch backend at `url` with the default timeout.
    #[must_use]
    pub fn elasticsearch(url: impl Into<String>) -> Self {
        Self::Elasticsearch {
            url: url.into(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Configuration for the gateway server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address to bind the HTTP server to.
    pub bind_addr: SocketAddr,
    /// Base URL used in reference links. Derived from the host name and
    /// port when unset.
    pub public_base_url: Option<String>,
    /// Storage backend.
    pub backend: BackendConfig,
    /// Coordination of concurrent partition creation.
    pub provisioning: ProvisionMode,
    /// Whether bulk writes ensure their partitions first.
    pub provision_on_bulk: bool,
    /// Maximum accepted request body size.
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            public_base_url: None,
            backend: BackendConfig::default(),
            provisioning: ProvisionMode::default(),
            provision_on_bulk: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl GatewayConfig {
    /// Create a new configuration with the specified bind address.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file.
    ///
    /// Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or fails validation.
    pub fn from_json(content: &str) -> GatewayResult<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| GatewayError::Config(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the public base URL.
    #[must_use]
    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    /// Set the storage backend.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    /// Set the provisioning mode.
    #[must_use]
    pub const fn with_provisioning(mut self, mode: ProvisionMode) -> Self {
        self.provisioning = mode;
        self
    }

    /// Enable or disable provisioning on bulk writes.
    #[must_use]
    pub const fn with_provision_on_bulk(mut self, enabled: bool) -> Self {
        self.provision_on_bulk = enabled;
        self
    }

    /// Set the request body limit.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range.
    pub fn validate(&self) -> GatewayResult<()> {
        if let Some(url) = &self.public_base_url {
            if !is_http_url(url) {
                return Err(GatewayError::Config(
                    "public_base_url must start with http:// or https://".to_string(),
                ));
            }
        }

        if self.max_body_bytes == 0 {
            return Err(GatewayError::Config(
                "max_body_bytes must be greater than 0".to_string(),
            ));
        }

        if let BackendConfig::Elasticsearch {
            url,
            request_timeout_secs,
        } = &self.backend
        {
            if !is_http_url(url) {
                return Err(GatewayError::Config(
                    "backend.url must start with http:// or https://".to_string(),
                ));
            }
            if *request_timeout_secs == 0 {
                return Err(GatewayError::Config(
                    "backend.request_timeout_secs must be greater than 0".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Base URL reference links are built under.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.public_base_url.clone().unwrap_or_else(|| {
            let host = hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "localhost".to_string());
            format!("http://{host}:{}{API_PREFIX}", self.bind_addr.port())
        })
    }

    /// Settings for the ingestion pipeline.
    #[must_use]
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            base_url: self.base_url(),
            provision_mode: self.provisioning,
            provision_on_bulk: self.provision_on_bulk,
            schema: PartitionSchema::metrics(),
        }
    }

    /// Settings for the Elasticsearch backend, if selected.
    #[must_use]
    pub fn elastic_config(&self) -> Option<ElasticConfig> {
        match &self.backend {
            BackendConfig::Memory => None,
            BackendConfig::Elasticsearch {
                url,
                request_timeout_secs,
            } => Some(
                ElasticConfig::new(url.clone())
                    .with_request_timeout(Duration::from_secs(*request_timeout_secs)),
            ),
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
