//! # mf-gateway
//!
//! HTTP front end of the metrics ingestion pipeline, built on axum.
//!
//! ## API Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/v1/mf/metrics` | POST | Bulk write, JSON array of records |
//! | `/v1/mf/metrics/{workflow}/{task}/{experiment}` | POST | Single write |
//! | `/v1/mf/metrics/{workflow}/{experiment}` | POST | Single write, optional `?task=` |
//! | `/health`, `/v1/mf/health` | GET | Liveness with version and uptime |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{BackendConfig, GatewayConfig};
pub use error::{GatewayError, GatewayResult};
pub use routes::create_router;
pub use server::GatewayServer;
pub use state::GatewayState;
