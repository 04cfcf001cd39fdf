//! Document storage for harvested race data
//!
//! Provides the store seam (MongoDB or in-process), the collection layout
//! and the sparse upsert layer the ingestion pipeline writes through.

pub mod document_store;
pub mod memory;
pub mod repository;
pub mod schema;

pub use document_store::{DocumentStore, MongoStore};
pub use memory::MemoryStore;
pub use repository::Repository;
pub use schema::{Collection, Key};
