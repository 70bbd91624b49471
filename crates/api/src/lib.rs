//! Group executor HTTP service.
//!
//! Exposes config, state, error handling, the preset store and routes so
//! the binary entrypoint and integration tests build the same app.

pub mod config;
pub mod error;
pub mod handlers;
pub mod presets;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
