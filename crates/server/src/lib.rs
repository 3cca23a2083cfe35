//! HTTP surface of the depot storage engine.
//!
//! This crate provides:
//! - Single-shot uploads with (hash, size) deduplication
//! - Resumable chunked uploads
//! - Range-aware downloads
//! - Reference-counted deletes

pub mod error;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod routes;
pub mod service;
pub mod state;

pub use error::ApiError;
pub use identity::{TraceId, Uploader};
pub use routes::create_router;
pub use service::FileService;
pub use state::AppState;
