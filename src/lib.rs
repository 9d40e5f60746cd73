//! metasync library: storage-backend metadata synchronization.
//!
//! This crate mirrors the bucket and object metadata of configured storage
//! backends into a document store, one aggregate document per backend, and
//! answers tenant-scoped aggregation queries over the mirrored documents.

pub mod config;
pub mod errors;
pub mod metadata;
pub mod metrics;
pub mod provider;
pub mod service;
pub mod sync;

pub use errors::SyncError;
pub use service::MetadataService;
