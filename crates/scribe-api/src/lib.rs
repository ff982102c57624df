//! # scribe-api
//!
//! HTTP API layer for the scribe transcription backend. The binary in
//! `main.rs` wires configuration, the database, the object store, the engine
//! client, and the background worker around the router built here.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod services;
pub mod state;

pub use error::ApiError;
pub use state::AppState;
