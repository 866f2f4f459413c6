//! Gateway server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use mf_ingest::SearchBackend;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::routes::create_router;
use crate::state::GatewayState;

/// HTTP server accepting metric samples.
#[derive(Debug)]
pub struct GatewayServer<B> {
    state: Arc<GatewayState<B>>,
}

impl<B: SearchBackend> GatewayServer<B> {
    /// Create a new server writing to `backend`.
    #[must_use]
    pub fn new(config: GatewayConfig, backend: Arc<B>) -> Self {
        Self {
            state: Arc::new(GatewayState::new(config, backend)),
        }
    }

    /// Get the shared state.
    #[must_use]
    pub fn state(&self) -> Arc<GatewayState<B>> {
        self.state.clone()
    }

    /// Start the server on the configured address.
    ///
    /// Runs until the server encounters a fatal error.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn serve(&self) -> GatewayResult<()> {
        self.serve_with_shutdown(std::future::pending::<()>()).await
    }

    /// Start the server with graceful shutdown support.
    ///
    /// The server shuts down when `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn serve_with_shutdown<F>(&self, shutdown: F) -> GatewayResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = self.state.config().bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::BindFailed(addr, e))?;

        self.run(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails while running.
    pub async fn run<F>(&self, listener: TcpListener, shutdown: F) -> GatewayResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr: Option<SocketAddr> = listener.local_addr().ok();
        info!(
            addr = ?addr,
            base_url = %self.state.ingestor().links().base(),
            "Gateway listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        info!("Gateway shut down");
        Ok(())
    }

    /// Create the router without starting the server.
    pub fn router(&self) -> axum::Router {
        create_router(self.state.clone())
    }
}
