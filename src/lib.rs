//! NAR race-record harvester.
//!
//! Fetches race, entry, result, profile and pedigree pages from netkeiba,
//! decodes them into typed records, sparse-upserts them into MongoDB and
//! answers cross-collection history queries with aggregation pipelines.

pub mod config;
pub mod error;
pub mod ingest;
pub mod query;
pub mod race_id;
pub mod retry;
pub mod scraper;
pub mod storage;
pub mod types;

pub use error::{Error, Result};
pub use race_id::{RaceId, Venue};
