//! Metadata storage layer.
//!
//! Synced backend aggregates are kept as JSON documents in a
//! [`store::DocumentStore`]; [`sqlite::SqliteDocumentStore`] is the default
//! implementation and [`memory::MemoryDocumentStore`] serves tests and
//! throwaway runs.  [`adapter::MetadataStoreAdapter`] layers upsert and
//! tenant-scoped querying on top.

pub mod adapter;
pub mod memory;
pub mod model;
pub mod pipeline;
pub mod sqlite;
pub mod store;
pub mod tenant;
