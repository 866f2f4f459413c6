//! Shared state for the gateway server.

use std::sync::Arc;
use std::time::Instant;

use mf_ingest::{Ingestor, SearchBackend};

use crate::config::GatewayConfig;

/// Shared state handed to every request handler.
#[derive(Debug)]
pub struct GatewayState<B> {
    config: Arc<GatewayConfig>,
    ingestor: Ingestor<B>,
    start_time: Instant,
}

impl<B: SearchBackend> GatewayState<B> {
    /// Create the state around an injected backend.
    pub fn new(config: GatewayConfig, backend: Arc<B>) -> Self {
        let ingestor = Ingestor::new(backend, config.ingest_config());
        Self {
            config: Arc::new(config),
            ingestor,
            start_time: Instant::now(),
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Get the ingestion pipeline.
    #[must_use]
    pub const fn ingestor(&self) -> &Ingestor<B> {
        &self.ingestor
    }

    /// Seconds since the state was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
