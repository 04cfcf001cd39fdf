//! Query engine: executes compiled pipelines and shapes their rows.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use mongodb::bson::{self, doc, Bson, Document};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::spec::{race_entries_pipeline, DuplicateQuery, HistoryQuery, SearchFilter};
use crate::error::{Context, Error, Result};
use crate::race_id::RaceId;
use crate::storage::{Collection, DocumentStore, Key};
use crate::types::{GroundCondition, PreEventInfo, Role, Surface, Weather};

/// Outcome of a keyed lookup; absence is an ordinary result.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// One historical start with its race metadata and result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub participant_id: Option<String>,
    pub race_id: String,
    pub entry_number: u32,
    pub date: Option<String>,
    pub race_name: Option<String>,
    pub venue: Option<String>,
    pub surface: Option<Surface>,
    pub distance: Option<u32>,
    pub direction: Option<String>,
    pub weather: Option<Weather>,
    pub ground_condition: Option<GroundCondition>,
    pub field_size: Option<u32>,
    pub prize: Option<f64>,
    /// Name of the joined participant: the jockey for horse queries, the
    /// horse otherwise.
    pub counterpart: Option<String>,
    pub carried_weight: Option<f64>,
    pub body_weight: Option<String>,
    pub odds: Option<f64>,
    pub popularity: Option<u32>,
    pub finish_position: Option<u32>,
    pub finish_status: Option<String>,
    pub time: Option<String>,
    pub margin: Option<String>,
    pub passing: Option<String>,
    pub pace: Option<String>,
    pub final_split: Option<f64>,
}

/// A race's starting entry with participant names resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryView {
    pub entry_number: u32,
    pub horse_id: Option<String>,
    pub jockey_id: Option<String>,
    pub trainer_id: Option<String>,
    pub horse: Option<String>,
    pub jockey: Option<String>,
    pub trainer: Option<String>,
    pub carried_weight: Option<f64>,
    pub body_weight: Option<String>,
}

/// Stored pre-event document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPreEvent {
    #[serde(rename = "_id")]
    pub race_id: String,
    pub date: Option<String>,
    #[serde(flatten)]
    pub info: PreEventInfo,
}

fn decode_rows<T: DeserializeOwned>(collection: Collection, rows: Vec<Document>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| bson::from_document(row).map_err(|e| Error::store("decode", collection.name(), e)))
        .collect()
}

fn strings(values: Vec<Bson>) -> BTreeSet<String> {
    values
        .into_iter()
        .filter_map(|value| match value {
            Bson::String(s) => Some(s),
            _ => None,
        })
        .collect()
}

/// Read side of the document store.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn DocumentStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Past starts for a single or batch history query. Zero matches is an
    /// empty result; a batch row whose label cannot be resolved is an error.
    pub async fn history(&self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>> {
        let operation = if query.is_batch() { "batch_history" } else { "history" };
        let rows = self
            .store
            .aggregate(Collection::StartingEntry, query.pipeline())
            .await
            .with_context(|| format!("{operation} {} {}", query.role(), query.describe()))?;

        for row in &rows {
            if !matches!(row.get("label"), Some(Bson::String(_))) {
                let id = row.get_str("participant_id").unwrap_or_default();
                return Err(Error::query(operation, id, "matched document has no label"));
            }
        }

        let records: Vec<HistoryRecord> = decode_rows(Collection::StartingEntry, rows)?;
        debug!(role = %query.role(), rows = records.len(), "history resolved");
        Ok(records)
    }

    /// History of one participant, labelled `label`.
    pub async fn participant_history(&self, role: Role, id: &str, label: &str) -> Result<Vec<HistoryRecord>> {
        self.history(&HistoryQuery::single(role, id, label)?).await
    }

    pub async fn search(&self, filter: &SearchFilter) -> Result<Vec<HistoryRecord>> {
        let rows = self
            .store
            .aggregate(Collection::StartingEntry, filter.pipeline())
            .await
            .with_context(|| format!("search {}", filter.role()))?;
        decode_rows(Collection::StartingEntry, rows)
    }

    /// Ids of `role` that start at least `threshold` times across `race_ids`.
    pub async fn find_duplicates(&self, race_ids: &[RaceId], role: Role, threshold: u32) -> Result<Vec<String>> {
        let query = DuplicateQuery::new(race_ids, role, threshold)?;
        let rows = self
            .store
            .aggregate(Collection::StartingEntry, query.pipeline())
            .await
            .with_context(|| format!("find_duplicates {role}"))?;

        let ids: Vec<String> = rows
            .into_iter()
            .filter_map(|row| row.get_str("_id").ok().map(str::to_string))
            .collect();
        info!(%role, races = race_ids.len(), threshold, found = ids.len(), "duplicates found");
        Ok(ids)
    }

    /// History of every participant recurring across `race_ids`, minus
    /// `exclude`. Labels are synthesized from the role's label base
    /// (101, 102, ... for horses) so they never collide with entry numbers.
    pub async fn co_occurring_history(
        &self,
        race_ids: &[RaceId],
        role: Role,
        threshold: u32,
        exclude: &[String],
    ) -> Result<Vec<HistoryRecord>> {
        let ids: Vec<String> = self
            .find_duplicates(race_ids, role, threshold)
            .await?
            .into_iter()
            .filter(|id| !exclude.contains(id))
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let base = role.label_base();
        let labels = (1..=ids.len() as u32).map(|k| (base + k).to_string()).collect();
        self.history(&HistoryQuery::batch(role, ids, labels)?).await
    }

    /// Starting entries of a race with participant names.
    pub async fn race_entries(&self, race_id: &RaceId) -> Result<Vec<EntryView>> {
        let rows = self
            .store
            .aggregate(Collection::StartingEntry, race_entries_pipeline(race_id))
            .await
            .with_context(|| format!("race_entries {race_id}"))?;
        decode_rows(Collection::StartingEntry, rows)
    }

    pub async fn pre_event(&self, race_id: &RaceId) -> Result<Lookup<StoredPreEvent>> {
        let found = self
            .store
            .find_one(Collection::PreEvent, Key::id(race_id.to_string()).filter())
            .await
            .with_context(|| format!("pre_event {race_id}"))?;
        match found {
            Some(document) => {
                let stored = bson::from_document(document).map_err(|e| Error::store("decode", "pre_event", e))?;
                Ok(Lookup::Found(stored))
            }
            None => Ok(Lookup::NotFound),
        }
    }

    /// Race ids whose pre-event date falls within `start..=end`.
    pub async fn race_ids_by_date(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<RaceId>> {
        let filter = doc! { "date": {
            "$gte": start.format("%Y-%m-%d").to_string(),
            "$lte": format!("{} 23:59", end.format("%Y-%m-%d")),
        } };
        let ids = self
            .store
            .distinct(Collection::PreEvent, "_id", filter)
            .await
            .with_context(|| format!("race_ids_by_date {start}..{end}"))?;

        let mut race_ids = strings(ids)
            .iter()
            .map(|id| id.parse::<RaceId>().map_err(Error::from))
            .collect::<Result<Vec<_>>>()?;
        race_ids.sort();
        Ok(race_ids)
    }

    /// Distinct ids of `role` entered in a race.
    pub async fn role_ids_by_race(&self, race_id: &RaceId, role: Role) -> Result<Vec<String>> {
        let ids = self
            .store
            .distinct(Collection::StartingEntry, role.id_field(), doc! { "race_id": race_id.to_string() })
            .await
            .with_context(|| format!("role_ids_by_race {race_id} {role}"))?;
        Ok(strings(ids).into_iter().collect())
    }

    /// Ids referenced by starting entries but absent from the role's
    /// profile collection.
    pub async fn missing_profile_ids(&self, role: Role) -> Result<Vec<String>> {
        let referenced = self
            .store
            .distinct(Collection::StartingEntry, role.id_field(), Document::new())
            .await?;
        let stored = self
            .store
            .distinct(Collection::profile(role), "_id", Document::new())
            .await?;

        let stored = strings(stored);
        Ok(strings(referenced)
            .into_iter()
            .filter(|id| !id.is_empty() && !stored.contains(id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::spec::Criterion;
    use crate::storage::MemoryStore;

    const A: &str = "202444010501";
    const B: &str = "202444010502";
    const C: &str = "202444010503";

    fn race(s: &str) -> RaceId {
        s.parse().unwrap()
    }

    fn entry(race_id: &str, entry_number: i64, horse: &str, jockey: &str) -> Document {
        doc! {
            "race_id": race_id,
            "entry_number": entry_number,
            "horse_id": horse,
            "jockey_id": jockey,
            "trainer_id": "01120",
        }
    }

    /// Across races A, B and C horse H starts twice and horse K once.
    fn seeded() -> QueryEngine {
        let store = Arc::new(MemoryStore::new());
        store.insert_many(
            Collection::StartingEntry,
            vec![
                entry(A, 1, "H", "j1"),
                entry(A, 2, "P", "j2"),
                entry(B, 1, "H", "j3"),
                entry(B, 2, "Q", "j2"),
                entry(C, 1, "K", "j1"),
                entry(C, 2, "R", "j3"),
            ],
        );
        store.insert_many(
            Collection::PreEvent,
            vec![
                doc! { "_id": A, "name": "一般", "date": "2024-01-05 14:00", "venue": "大井", "surface": "ダ", "distance": 1200_i64 },
                doc! { "_id": B, "name": "特別", "date": "2024-01-05 14:30", "venue": "大井", "surface": "ダ", "distance": 1600_i64 },
                doc! { "_id": C, "name": "東京記念", "date": "2024-01-05 15:00", "venue": "大井", "surface": "ダ", "distance": 2400_i64 },
            ],
        );
        store.insert_many(
            Collection::Result,
            vec![doc! { "race_id": B, "entry_number": 1_i64, "finish_position": 1_i64, "time": "1:41.2" }],
        );
        store.insert_many(
            Collection::Jockey,
            vec![doc! { "_id": "j1", "name": "御神本訓史" }, doc! { "_id": "j3", "name": "森泰斗" }],
        );
        store.insert_many(Collection::Horse, vec![doc! { "_id": "H", "name": "ホースH", "trainer_id": "01120" }]);
        QueryEngine::new(store)
    }

    fn abc() -> Vec<RaceId> {
        vec![race(A), race(B), race(C)]
    }

    #[tokio::test]
    async fn test_find_duplicates() {
        let engine = seeded();
        let ids = engine.find_duplicates(&abc(), Role::Horse, 2).await.unwrap();
        assert_eq!(ids, vec!["H".to_string()]);

        let ids = engine.find_duplicates(&abc(), Role::Horse, 3).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_find_duplicates_only_counts_given_races() {
        let engine = seeded();
        let ids = engine.find_duplicates(&[race(A), race(C)], Role::Horse, 2).await.unwrap();
        assert!(ids.is_empty());

        let ids = engine.find_duplicates(&[race(A), race(B)], Role::Jockey, 2).await.unwrap();
        assert_eq!(ids, vec!["j2".to_string()]);
    }

    #[tokio::test]
    async fn test_single_history_joins() {
        let engine = seeded();
        let rows = engine.participant_history(Role::Horse, "H", "7").await.unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.label.as_deref() == Some("7")));
        let newest = &rows[0];
        assert_eq!(newest.race_id, B);
        assert_eq!(newest.race_name.as_deref(), Some("特別"));
        assert_eq!(newest.distance, Some(1600));
        assert_eq!(newest.surface, Some(Surface::Dirt));
        assert_eq!(newest.finish_position, Some(1));
        assert_eq!(newest.counterpart.as_deref(), Some("森泰斗"));
        assert_eq!(rows[1].race_id, A);
        assert_eq!(rows[1].finish_position, None);
    }

    #[tokio::test]
    async fn test_history_keeps_starts_without_profiles() {
        let engine = seeded();
        let rows = engine.participant_history(Role::Horse, "P", "2").await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].counterpart, None);
        assert_eq!(rows[0].participant_id.as_deref(), Some("P"));
    }

    #[tokio::test]
    async fn test_unknown_id_yields_empty_history() {
        let engine = seeded();
        let rows = engine.participant_history(Role::Jockey, "nobody", "1").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_batch_labels_follow_ids() {
        let engine = seeded();
        let query = HistoryQuery::from_pairs(
            Role::Jockey,
            vec![("j3".to_string(), "2".to_string()), ("j1".to_string(), "1".to_string())],
        )
        .unwrap();

        let rows = engine.history(&query).await.unwrap();

        assert_eq!(rows.len(), 4);
        for row in rows {
            let expected = match row.participant_id.as_deref() {
                Some("j1") => "1",
                Some("j3") => "2",
                other => panic!("unexpected participant {other:?}"),
            };
            assert_eq!(row.label.as_deref(), Some(expected));
        }
    }

    #[tokio::test]
    async fn test_co_occurring_history_labels() {
        let engine = seeded();
        let rows = engine
            .co_occurring_history(&abc(), Role::Jockey, 2, &["j2".to_string()])
            .await
            .unwrap();

        assert_eq!(rows.len(), 4);
        for row in rows {
            let expected = match row.participant_id.as_deref() {
                Some("j1") => "1001",
                Some("j3") => "1002",
                other => panic!("unexpected participant {other:?}"),
            };
            assert_eq!(row.label.as_deref(), Some(expected));
        }

        let none = engine
            .co_occurring_history(&abc(), Role::Horse, 2, &["H".to_string()])
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_search_filters() {
        let engine = seeded();
        let filter = SearchFilter::builder(Role::Horse)
            .race_name(Criterion::Exactly("記念".into()))
            .surface(Criterion::Exactly(Surface::Dirt))
            .dates(NaiveDate::from_ymd_opt(2024, 1, 5), NaiveDate::from_ymd_opt(2024, 1, 5))
            .build()
            .unwrap();

        let rows = engine.search(&filter).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.race_id == C));

        // an empty venue is a real value, not a wildcard
        let filter = SearchFilter::builder(Role::Horse)
            .venue(Criterion::Exactly(String::new()))
            .build()
            .unwrap();
        assert!(engine.search(&filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pre_event_lookup() {
        let engine = seeded();
        let stored = engine.pre_event(&race(C)).await.unwrap().found().unwrap();
        assert_eq!(stored.info.distance, Some(2400));
        assert_eq!(stored.info.name.as_deref(), Some("東京記念"));
        assert_eq!(stored.date.as_deref(), Some("2024-01-05 15:00"));

        let missing = engine.pre_event(&race("202444010512")).await.unwrap();
        assert_eq!(missing, Lookup::NotFound);
    }

    #[tokio::test]
    async fn test_race_ids_by_date_and_role_ids() {
        let engine = seeded();
        let day = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(engine.race_ids_by_date(day, day).await.unwrap(), abc());

        let next = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        assert!(engine.race_ids_by_date(next, next).await.unwrap().is_empty());

        let jockeys = engine.role_ids_by_race(&race(A), Role::Jockey).await.unwrap();
        assert_eq!(jockeys, vec!["j1".to_string(), "j2".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_profile_ids() {
        let engine = seeded();
        assert_eq!(engine.missing_profile_ids(Role::Jockey).await.unwrap(), vec!["j2".to_string()]);
        assert_eq!(engine.missing_profile_ids(Role::Trainer).await.unwrap(), vec!["01120".to_string()]);
        assert_eq!(
            engine.missing_profile_ids(Role::Horse).await.unwrap(),
            vec!["K".to_string(), "P".to_string(), "Q".to_string(), "R".to_string()]
        );
    }

    #[tokio::test]
    async fn test_race_entries_view() {
        let engine = seeded();
        let entries = engine.race_entries(&race(A)).await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].horse.as_deref(), Some("ホースH"));
        assert_eq!(entries[0].jockey.as_deref(), Some("御神本訓史"));
        assert_eq!(entries[0].trainer, None);
        assert_eq!(entries[1].horse, None);
    }
}
