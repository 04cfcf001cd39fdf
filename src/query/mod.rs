//! Cross-collection history queries
//!
//! Queries are described by validated values in [`spec`] and compiled to
//! aggregation pipelines there; [`engine`] runs them against a
//! [`DocumentStore`](crate::storage::DocumentStore) and decodes the rows.

pub mod engine;
pub mod spec;

pub use engine::{EntryView, HistoryRecord, Lookup, QueryEngine, StoredPreEvent};
pub use spec::{Criterion, DuplicateQuery, HistoryQuery, SearchFilter};
