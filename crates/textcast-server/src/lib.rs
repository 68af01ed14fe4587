//! # textcast-server
//!
//! Axum HTTP server for textcast.
//!
//! - `GET /api?text=...`, `POST /api`: publish a new text
//! - `GET /api`, `GET /api/refresh`: open an event stream
//! - `POST /api/refresh`: broadcast a refresh signal
//! - `GET /api/history`: latest value and retained history
//! - `GET /health`: liveness and counters
//! - Graceful shutdown via `CancellationToken`, which also ends open streams

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod logging;
pub mod server;
pub mod shutdown;
pub mod stream;

pub use config::ServerConfig;
pub use errors::ApiError;
pub use server::{AppState, ServerHandle, TextcastServer};
pub use shutdown::ShutdownCoordinator;
