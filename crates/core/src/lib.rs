//! Core domain types and shared logic for the depot storage engine.
//!
//! This crate defines the data model used across all other crates:
//! - Content hashes and content keys
//! - Logical file descriptors and identifiers
//! - Resumable upload sessions and chunk arithmetic
//! - HTTP byte range parsing
//! - Configuration

mod id;

pub mod config;
pub mod error;
pub mod file;
pub mod hash;
pub mod range;
pub mod upload;

pub use error::{Error, Result};
pub use file::{ContentKey, FileId, LogicalFile, file_extension};
pub use hash::{ContentHash, ContentHasher};
pub use range::ByteRange;
pub use upload::{PartFileStatus, SessionId, UploadState};

/// Default chunk size: 16 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 16 * 1024 * 1024;

/// Maximum chunk size: 32 MiB
pub const MAX_CHUNK_SIZE: u64 = 32 * 1024 * 1024;

/// Minimum chunk size: 1 MiB
pub const MIN_CHUNK_SIZE: u64 = 1024 * 1024;

/// Default single-shot upload limit: 10 GiB
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 10 * 1024 * 1024 * 1024;
