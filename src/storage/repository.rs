//! Upsert store: idempotent sparse writes and existence checks.
//!
//! Every write is a `$set` upsert keyed by the record's natural key. Empty
//! strings, numeric zeros and absent values are dropped from the payload
//! first, so a later partial fetch never clobbers a stored value.

use std::sync::Arc;

use mongodb::bson::{self, Bson, Document};
use serde::Serialize;
use tracing::debug;

use super::document_store::DocumentStore;
use super::schema::{Collection, Key};
use crate::error::{Error, Result};
use crate::race_id::RaceId;
use crate::types::{HistoryRow, HorseProfile, HumanProfile, Pedigree, PreEventInfo, ResultEntry, Role, StartingEntry};

/// Drop empty-string, zero and null fields.
pub fn sparse(fields: Document) -> Document {
    fields
        .into_iter()
        .filter(|(_, value)| !is_empty_value(value))
        .collect()
}

fn is_empty_value(value: &Bson) -> bool {
    match value {
        Bson::Null => true,
        Bson::String(s) => s.is_empty(),
        Bson::Int32(v) => *v == 0,
        Bson::Int64(v) => *v == 0,
        Bson::Double(v) => *v == 0.0,
        _ => false,
    }
}

/// `"YYYY-MM-DD HH:MM"` when the start time is known, else `"YYYY-MM-DD"`.
pub fn event_date(race_id: &RaceId, start_time: Option<&str>) -> String {
    let date = race_id.date().format("%Y-%m-%d");
    match start_time.map(str::trim).filter(|t| !t.is_empty()) {
        Some(time) => format!("{date} {time}"),
        None => date.to_string(),
    }
}

fn to_document<T: Serialize>(collection: Collection, record: &T) -> Result<Document> {
    bson::to_document(record).map_err(|e| Error::store("serialize", collection.name(), e))
}

/// Write side of the document store.
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn DocumentStore>,
}

impl Repository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Sparse upsert of `fields` under `key`. Returns `false` when nothing
    /// was left to write.
    pub async fn upsert(&self, collection: Collection, key: &Key, fields: Document) -> Result<bool> {
        let mut payload = sparse(fields);
        for field in key.filter().keys() {
            payload.remove(field);
        }
        if payload.is_empty() {
            debug!(%collection, %key, "empty payload, skipping write");
            return Ok(false);
        }
        self.store.upsert(collection, key.filter(), payload).await?;
        Ok(true)
    }

    /// One independent upsert per record; stops at the first failure.
    pub async fn upsert_many(&self, collection: Collection, records: Vec<(Key, Document)>) -> Result<usize> {
        let mut written = 0;
        for (key, fields) in records {
            if self.upsert(collection, &key, fields).await? {
                written += 1;
            }
        }
        debug!(%collection, written, "batch upserted");
        Ok(written)
    }

    pub async fn exists(&self, collection: Collection, key: &Key) -> Result<bool> {
        Ok(self.store.count(collection, key.filter()).await? > 0)
    }

    pub async fn pre_event_exists(&self, race_id: &RaceId) -> Result<bool> {
        self.exists(Collection::PreEvent, &Key::id(race_id.to_string())).await
    }

    pub async fn starting_entry_exists(&self, race_id: &RaceId, entry_number: u32) -> Result<bool> {
        self.exists(Collection::StartingEntry, &Key::entry(race_id, entry_number)).await
    }

    /// Whether any result row is stored for the race.
    pub async fn results_exist(&self, race_id: &RaceId) -> Result<bool> {
        let filter = bson::doc! { "race_id": race_id.to_string() };
        Ok(self.store.count(Collection::Result, filter).await? > 0)
    }

    pub async fn profile_exists(&self, role: Role, id: &str) -> Result<bool> {
        self.exists(Collection::profile(role), &Key::id(id)).await
    }

    pub async fn pedigree_exists(&self, horse_id: &str) -> Result<bool> {
        self.exists(Collection::Pedigree, &Key::id(horse_id)).await
    }

    /// Trainer id recorded on a horse's profile.
    pub async fn horse_trainer_id(&self, horse_id: &str) -> Result<Option<String>> {
        let horse = self.store.find_one(Collection::Horse, Key::id(horse_id).filter()).await?;
        Ok(horse.and_then(|h| h.get_str("trainer_id").ok().map(str::to_string)))
    }

    pub async fn save_pre_event(&self, race_id: &RaceId, info: &PreEventInfo) -> Result<bool> {
        let mut fields = to_document(Collection::PreEvent, info)?;
        fields.insert("date", event_date(race_id, info.start_time.as_deref()));
        self.upsert(Collection::PreEvent, &Key::id(race_id.to_string()), fields).await
    }

    pub async fn save_starting_entries(&self, race_id: &RaceId, entries: &[StartingEntry]) -> Result<usize> {
        let records = entries
            .iter()
            .map(|entry| Ok((Key::entry(race_id, entry.entry_number), to_document(Collection::StartingEntry, entry)?)))
            .collect::<Result<Vec<_>>>()?;
        self.upsert_many(Collection::StartingEntry, records).await
    }

    pub async fn save_results(&self, race_id: &RaceId, results: &[ResultEntry]) -> Result<usize> {
        let records = results
            .iter()
            .map(|result| Ok((Key::entry(race_id, result.entry_number), to_document(Collection::Result, result)?)))
            .collect::<Result<Vec<_>>>()?;
        self.upsert_many(Collection::Result, records).await
    }

    pub async fn save_horse(&self, horse_id: &str, profile: &HorseProfile) -> Result<bool> {
        let fields = to_document(Collection::Horse, profile)?;
        self.upsert(Collection::Horse, &Key::id(horse_id), fields).await
    }

    pub async fn save_human(&self, role: Role, id: &str, profile: &HumanProfile) -> Result<bool> {
        let collection = Collection::profile(role);
        let fields = to_document(collection, profile)?;
        self.upsert(collection, &Key::id(id), fields).await
    }

    /// Ancestors are stored flat, one field per generation-path code.
    pub async fn save_pedigree(&self, horse_id: &str, pedigree: &Pedigree) -> Result<bool> {
        let fields: Document = pedigree
            .ancestors
            .iter()
            .map(|(path, id)| (path.clone(), id.clone().map_or(Bson::Null, Bson::String)))
            .collect();
        self.upsert(Collection::Pedigree, &Key::id(horse_id), fields).await
    }

    /// Spread a horse's past-performance rows over pre_event, starting_entry
    /// and result. `trainer_id` comes from the horse profile since history
    /// rows do not name one.
    pub async fn save_history(&self, horse_id: &str, trainer_id: Option<&str>, rows: &[HistoryRow]) -> Result<usize> {
        let mut pre_events = Vec::with_capacity(rows.len());
        let mut entries = Vec::with_capacity(rows.len());
        let mut results = Vec::with_capacity(rows.len());

        for row in rows {
            let race_id = row.race_id()?;

            // History rows carry no post time; keep a dated race card intact.
            let mut pre_event = to_document(Collection::PreEvent, &row.pre_event)?;
            if !self.pre_event_exists(&race_id).await? {
                pre_event.insert("date", event_date(&race_id, row.pre_event.start_time.as_deref()));
            }
            pre_events.push((Key::id(race_id.to_string()), pre_event));

            let mut entry = row.entry.clone();
            entry.horse_id = Some(horse_id.to_string());
            if entry.trainer_id.is_none() {
                entry.trainer_id = trainer_id.map(str::to_string);
            }
            let entry_fields = to_document(Collection::StartingEntry, &entry)?;
            entries.push((Key::entry(&race_id, entry.entry_number), entry_fields));

            results.push((
                Key::entry(&race_id, row.result.entry_number),
                to_document(Collection::Result, &row.result)?,
            ));
        }

        self.upsert_many(Collection::PreEvent, pre_events).await?;
        self.upsert_many(Collection::StartingEntry, entries).await?;
        self.upsert_many(Collection::Result, results).await
    }
}
