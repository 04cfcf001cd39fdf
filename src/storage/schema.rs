//! Document-store layout: collections, record keys and index definitions.
//!
//! Collections:
//! - pre_event: race metadata, keyed by race id (`_id`)
//! - starting_entry: one document per (race_id, entry_number)
//! - result: one document per (race_id, entry_number)
//! - horse / jockey / trainer: profiles keyed by entity id (`_id`)
//! - pedigree: generation-path code -> ancestor id, keyed by horse id (`_id`)

use std::fmt;

use mongodb::bson::{doc, Document};

use crate::race_id::RaceId;
use crate::types::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    PreEvent,
    StartingEntry,
    Result,
    Horse,
    Jockey,
    Trainer,
    Pedigree,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::PreEvent,
        Collection::StartingEntry,
        Collection::Result,
        Collection::Horse,
        Collection::Jockey,
        Collection::Trainer,
        Collection::Pedigree,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::PreEvent => "pre_event",
            Collection::StartingEntry => "starting_entry",
            Collection::Result => "result",
            Collection::Horse => "horse",
            Collection::Jockey => "jockey",
            Collection::Trainer => "trainer",
            Collection::Pedigree => "pedigree",
        }
    }

    /// Profile collection of a participant role.
    pub fn profile(role: Role) -> Self {
        match role {
            Role::Horse => Collection::Horse,
            Role::Jockey => Collection::Jockey,
            Role::Trainer => Collection::Trainer,
        }
    }

    /// Whether documents are keyed by (race_id, entry_number) rather than `_id`.
    pub fn keyed_by_entry(&self) -> bool {
        matches!(self, Collection::StartingEntry | Collection::Result)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Natural key of a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Id(String),
    Entry { race_id: String, entry_number: u32 },
}

impl Key {
    pub fn id(id: impl Into<String>) -> Self {
        Key::Id(id.into())
    }

    pub fn entry(race_id: &RaceId, entry_number: u32) -> Self {
        Key::Entry {
            race_id: race_id.to_string(),
            entry_number,
        }
    }

    /// Equality filter selecting exactly this record.
    pub fn filter(&self) -> Document {
        match self {
            Key::Id(id) => doc! { "_id": id.as_str() },
            Key::Entry { race_id, entry_number } => doc! {
                "race_id": race_id.as_str(),
                "entry_number": i64::from(*entry_number),
            },
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Id(id) => f.write_str(id),
            Key::Entry { race_id, entry_number } => write!(f, "{race_id}#{entry_number}"),
        }
    }
}

/// A secondary index; key direction `-1` is descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub collection: Collection,
    pub name: &'static str,
    pub keys: &'static [(&'static str, i32)],
}

impl IndexSpec {
    pub fn keys_document(&self) -> Document {
        let mut keys = Document::new();
        for (field, direction) in self.keys {
            keys.insert(*field, *direction);
        }
        keys
    }

    /// The server maintains `_id` indexes itself.
    pub fn is_implicit(&self) -> bool {
        matches!(self.keys, [("_id", _)])
    }
}

pub const INDEXES: &[IndexSpec] = &[
    IndexSpec {
        collection: Collection::StartingEntry,
        name: "starting_entry_index",
        keys: &[("race_id", -1), ("entry_number", 1)],
    },
    IndexSpec {
        collection: Collection::StartingEntry,
        name: "starting_entry_race_id_index",
        keys: &[("race_id", 1)],
    },
    IndexSpec {
        collection: Collection::Result,
        name: "result_index",
        keys: &[("race_id", -1), ("entry_number", 1)],
    },
    IndexSpec {
        collection: Collection::Result,
        name: "result_race_id_index",
        keys: &[("race_id", 1)],
    },
    IndexSpec {
        collection: Collection::PreEvent,
        name: "pre_event_index",
        keys: &[("_id", 1)],
    },
    IndexSpec {
        collection: Collection::Horse,
        name: "horse_index",
        keys: &[("_id", 1)],
    },
    IndexSpec {
        collection: Collection::Jockey,
        name: "jockey_index",
        keys: &[("_id", 1)],
    },
    IndexSpec {
        collection: Collection::Trainer,
        name: "trainer_index",
        keys: &[("_id", 1)],
    },
    IndexSpec {
        collection: Collection::Pedigree,
        name: "pedigree_index",
        keys: &[("_id", 1)],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_collection_is_indexed() {
        for collection in Collection::ALL {
            assert!(INDEXES.iter().any(|i| i.collection == collection), "{collection}");
        }
    }

    #[test]
    fn test_entry_key_filter() {
        let race_id: RaceId = "202444010511".parse().unwrap();
        let filter = Key::entry(&race_id, 7).filter();
        assert_eq!(filter.get_str("race_id").unwrap(), "202444010511");
        assert_eq!(filter.get_i64("entry_number").unwrap(), 7);
    }

    #[test]
    fn test_composite_index_keys() {
        let spec = &INDEXES[0];
        assert_eq!(spec.keys_document(), doc! { "race_id": -1, "entry_number": 1 });
        assert!(!spec.is_implicit());
        assert!(INDEXES[4].is_implicit());
    }
}
