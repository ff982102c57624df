//! # scribe-storage
//!
//! Object store clients for the scribe transcription backend.
//!
//! Implements the [`scribe_core::ObjectStore`] seam twice:
//! - [`S3ObjectStore`] — any S3-compatible store, with SigV4 query presigning
//!   for direct client part uploads and signed multipart finalize/abort calls.
//! - [`InMemoryObjectStore`] — a test double that tracks multipart state and
//!   counts finalize calls.

pub mod memory;
pub mod s3;

pub use memory::InMemoryObjectStore;
pub use s3::{S3Config, S3ObjectStore};
