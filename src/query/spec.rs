//! Validated query descriptions and their compilation to aggregation
//! pipelines.
//!
//! Every history-shaped query runs over `starting_entry` and left-joins, in
//! order: `pre_event` by race id (`race_info`), the counterpart profile by
//! its id (`{counterpart}_data`), and `result` by (race id, entry number)
//! (`race_results`). The projection then flattens the joined documents into
//! one row per start.

use std::collections::HashSet;

use chrono::NaiveDate;
use mongodb::bson::{doc, Bson, Document};

use crate::error::{Error, Result};
use crate::race_id::RaceId;
use crate::types::{Role, Surface};

/// A filter value, or the wildcard that matches any stored value.
///
/// The wildcard is distinct from an empty string, which is a real value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Criterion<T> {
    #[default]
    Any,
    Exactly(T),
}

impl<T> From<Option<T>> for Criterion<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Criterion::Any, Criterion::Exactly)
    }
}

impl<T: Clone + Into<Bson>> Criterion<T> {
    fn condition(&self) -> Bson {
        match self {
            Criterion::Any => Bson::Document(doc! { "$exists": 1 }),
            Criterion::Exactly(value) => value.clone().into(),
        }
    }
}

fn lookups(role: Role) -> Vec<Document> {
    let counterpart = role.counterpart();
    let mut stages = race_info_lookup();
    stages.extend(counterpart_and_result_lookup(counterpart));
    stages
}

fn race_info_lookup() -> Vec<Document> {
    vec![
        doc! { "$lookup": {
            "from": "pre_event",
            "localField": "race_id",
            "foreignField": "_id",
            "as": "race_info",
        } },
        doc! { "$unwind": { "path": "$race_info", "preserveNullAndEmptyArrays": true } },
    ]
}

fn counterpart_and_result_lookup(counterpart: Role) -> Vec<Document> {
    let data = format!("{}_data", counterpart.as_str());
    vec![
        doc! { "$lookup": {
            "from": counterpart.as_str(),
            "localField": counterpart.id_field(),
            "foreignField": "_id",
            "as": data.as_str(),
        } },
        doc! { "$unwind": { "path": format!("${data}"), "preserveNullAndEmptyArrays": true } },
        doc! { "$lookup": {
            "from": "result",
            "let": { "race_id": "$race_id", "entry_number": "$entry_number" },
            "pipeline": [
                { "$match": { "$expr": { "$and": [
                    { "$eq": ["$race_id", "$$race_id"] },
                    { "$eq": ["$entry_number", "$$entry_number"] },
                ] } } },
            ],
            "as": "race_results",
        } },
        doc! { "$unwind": { "path": "$race_results", "preserveNullAndEmptyArrays": true } },
    ]
}

fn projection(role: Role) -> Document {
    let counterpart = role.counterpart();
    doc! {
        "_id": 0,
        "participant_id": format!("${}", role.id_field()),
        "race_id": "$race_id",
        "entry_number": 1,
        "carried_weight": 1,
        "body_weight": 1,
        "odds": 1,
        "popularity": 1,
        "counterpart": format!("${}_data.name", counterpart.as_str()),
        "date": "$race_info.date",
        "race_name": "$race_info.name",
        "venue": "$race_info.venue",
        "surface": "$race_info.surface",
        "distance": "$race_info.distance",
        "direction": "$race_info.direction",
        "weather": "$race_info.weather",
        "ground_condition": "$race_info.ground_condition",
        "field_size": "$race_info.field_size",
        "prize": "$race_info.prize",
        "finish_position": "$race_results.finish_position",
        "finish_status": "$race_results.finish_status",
        "time": "$race_results.time",
        "margin": "$race_results.margin",
        "passing": "$race_results.passing",
        "pace": "$race_results.pace",
        "final_split": "$race_results.final_split",
    }
}

fn newest_first() -> Document {
    doc! { "$sort": { "date": -1, "race_id": -1 } }
}

#[derive(Debug, Clone, PartialEq)]
enum Target {
    Single { id: String, label: String },
    Batch { ids: Vec<String>, labels: Vec<String> },
}

/// Past starts of one or many participants, each row carrying the caller's
/// label for the participant it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    role: Role,
    target: Target,
}

impl HistoryQuery {
    pub fn single(role: Role, id: impl Into<String>, label: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::query("history", id, "empty participant id"));
        }
        Ok(Self {
            role,
            target: Target::Single {
                id,
                label: label.into(),
            },
        })
    }

    /// Labels pair with ids by position. Ids must be unique and the two
    /// lists the same length.
    pub fn batch(role: Role, ids: Vec<String>, labels: Vec<String>) -> Result<Self> {
        if ids.len() != labels.len() {
            return Err(Error::query(
                "batch_history",
                ids.join(","),
                format!("{} ids but {} labels", ids.len(), labels.len()),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(Error::query("batch_history", duplicate.clone(), "id listed twice"));
        }
        Ok(Self {
            role,
            target: Target::Batch { ids, labels },
        })
    }

    /// Ordered `(id, label)` pairs.
    pub fn from_pairs(role: Role, pairs: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let (ids, labels) = pairs.into_iter().unzip();
        Self::batch(role, ids, labels)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_batch(&self) -> bool {
        matches!(self.target, Target::Batch { .. })
    }

    /// Comma-joined ids, for error reports.
    pub fn describe(&self) -> String {
        match &self.target {
            Target::Single { id, .. } => id.clone(),
            Target::Batch { ids, .. } => ids.join(","),
        }
    }

    pub fn pipeline(&self) -> Vec<Document> {
        let id_field = self.role.id_field();
        let (filter, label) = match &self.target {
            Target::Single { id, label } => (doc! { id_field: id.as_str() }, Bson::Document(doc! { "$literal": label.as_str() })),
            Target::Batch { ids, labels } => (
                doc! { id_field: { "$in": ids.clone() }, "entry_number": { "$ne": 0 } },
                Bson::Document(doc! {
                    "$arrayElemAt": [
                        labels.clone(),
                        { "$indexOfArray": [ids.clone(), format!("${id_field}")] },
                    ],
                }),
            ),
        };

        let mut project = projection(self.role);
        project.insert("label", label);

        let mut pipeline = vec![doc! { "$match": filter }];
        pipeline.extend(lookups(self.role));
        pipeline.push(doc! { "$project": project });
        pipeline.push(newest_first());
        pipeline
    }
}

/// Historical starts matching race-level criteria.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchFilter {
    role: Role,
    race_name: Criterion<String>,
    venue: Criterion<String>,
    surface: Criterion<Surface>,
    distance: Criterion<u32>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    participant: Criterion<String>,
}

impl SearchFilter {
    pub fn builder(role: Role) -> SearchFilterBuilder {
        SearchFilterBuilder {
            filter: SearchFilter {
                role,
                race_name: Criterion::Any,
                venue: Criterion::Any,
                surface: Criterion::Any,
                distance: Criterion::Any,
                from: None,
                to: None,
                participant: Criterion::Any,
            },
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn date_condition(&self) -> Bson {
        let day = |date: NaiveDate| date.format("%Y-%m-%d").to_string();
        let condition = match (self.from, self.to) {
            (None, None) => doc! { "$exists": 1 },
            (Some(from), None) => doc! { "$gte": day(from) },
            (None, Some(to)) => doc! { "$lte": format!("{} 23:59", day(to)) },
            (Some(from), Some(to)) => doc! { "$gte": day(from), "$lte": format!("{} 23:59", day(to)) },
        };
        Bson::Document(condition)
    }

    pub fn pipeline(&self) -> Vec<Document> {
        let race_name = match &self.race_name {
            Criterion::Any => Bson::Document(doc! { "$exists": 1 }),
            Criterion::Exactly(pattern) => Bson::Document(doc! { "$regex": pattern.as_str() }),
        };
        let surface = match self.surface {
            Criterion::Any => Criterion::Any,
            Criterion::Exactly(surface) => Criterion::Exactly(surface.label().to_string()),
        };
        let distance = match self.distance {
            Criterion::Any => Criterion::Any,
            Criterion::Exactly(distance) => Criterion::Exactly(i64::from(distance)),
        };

        let filter = doc! {
            "race_info.name": race_name,
            "race_info.venue": self.venue.condition(),
            "race_info.surface": surface.condition(),
            "race_info.distance": distance.condition(),
            "race_info.date": self.date_condition(),
            self.role.id_field(): self.participant.condition(),
        };

        let mut pipeline = race_info_lookup();
        pipeline.push(doc! { "$match": filter });
        pipeline.extend(counterpart_and_result_lookup(self.role.counterpart()));
        pipeline.push(doc! { "$project": projection(self.role) });
        pipeline.push(newest_first());
        pipeline
    }
}

pub struct SearchFilterBuilder {
    filter: SearchFilter,
}

impl SearchFilterBuilder {
    /// Regular expression matched against the race name.
    pub fn race_name(mut self, pattern: Criterion<String>) -> Self {
        self.filter.race_name = pattern;
        self
    }

    pub fn venue(mut self, venue: Criterion<String>) -> Self {
        self.filter.venue = venue;
        self
    }

    pub fn surface(mut self, surface: Criterion<Surface>) -> Self {
        self.filter.surface = surface;
        self
    }

    pub fn distance(mut self, distance: Criterion<u32>) -> Self {
        self.filter.distance = distance;
        self
    }

    /// Inclusive date range; either end may be open.
    pub fn dates(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.filter.from = from;
        self.filter.to = to;
        self
    }

    pub fn participant(mut self, id: Criterion<String>) -> Self {
        self.filter.participant = id;
        self
    }

    pub fn build(self) -> Result<SearchFilter> {
        let filter = self.filter;
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(Error::query("search", format!("{from}..{to}"), "date range ends before it starts"));
            }
        }
        if let Criterion::Exactly(pattern) = &filter.race_name {
            regex::Regex::new(pattern).map_err(|e| Error::query("search", pattern.clone(), e.to_string()))?;
        }
        Ok(filter)
    }
}

/// Participants of `role` starting at least `threshold` times across a set
/// of races.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateQuery {
    race_ids: Vec<String>,
    role: Role,
    threshold: u32,
}

impl DuplicateQuery {
    pub fn new(race_ids: &[RaceId], role: Role, threshold: u32) -> Result<Self> {
        if threshold == 0 {
            return Err(Error::query("find_duplicates", role.as_str(), "threshold must be at least 1"));
        }
        Ok(Self {
            race_ids: race_ids.iter().map(RaceId::to_string).collect(),
            role,
            threshold,
        })
    }

    pub fn pipeline(&self) -> Vec<Document> {
        let id_field = self.role.id_field();
        vec![
            doc! { "$match": {
                "race_id": { "$in": self.race_ids.clone() },
                id_field: { "$nin": [Bson::Null, ""] },
            } },
            doc! { "$group": { "_id": format!("${id_field}"), "count": { "$sum": 1 } } },
            doc! { "$match": { "count": { "$gte": i64::from(self.threshold) } } },
            doc! { "$sort": { "_id": 1 } },
        ]
    }
}

/// Starting entries of one race joined with participant names.
pub fn race_entries_pipeline(race_id: &RaceId) -> Vec<Document> {
    let mut pipeline = vec![doc! { "$match": { "race_id": race_id.to_string() } }];
    for role in [Role::Horse, Role::Jockey, Role::Trainer] {
        let data = format!("{}_data", role.as_str());
        pipeline.push(doc! { "$lookup": {
            "from": role.as_str(),
            "localField": role.id_field(),
            "foreignField": "_id",
            "as": data.as_str(),
        } });
        pipeline.push(doc! { "$unwind": { "path": format!("${data}"), "preserveNullAndEmptyArrays": true } });
    }
    pipeline.push(doc! { "$project": {
        "_id": 0,
        "entry_number": 1,
        "horse_id": 1,
        "jockey_id": 1,
        "trainer_id": 1,
        "horse": "$horse_data.name",
        "jockey": "$jockey_data.name",
        "trainer": "$trainer_data.name",
        "carried_weight": 1,
        "body_weight": 1,
    } });
    pipeline.push(doc! { "$sort": { "entry_number": 1 } });
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_names(pipeline: &[Document]) -> Vec<String> {
        pipeline
            .iter()
            .map(|stage| stage.keys().next().cloned().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_single_pipeline_shape() {
        let query = HistoryQuery::single(Role::Horse, "2020100001", "3").unwrap();
        let pipeline = query.pipeline();

        assert_eq!(
            stage_names(&pipeline),
            vec!["$match", "$lookup", "$unwind", "$lookup", "$unwind", "$lookup", "$unwind", "$project", "$sort"]
        );
        assert_eq!(pipeline[0], doc! { "$match": { "horse_id": "2020100001" } });
        // horses are shown beside their jockey
        assert_eq!(pipeline[3].get_document("$lookup").unwrap().get_str("from").unwrap(), "jockey");
    }

    #[test]
    fn test_batch_label_expression() {
        let query = HistoryQuery::from_pairs(
            Role::Jockey,
            vec![("x".to_string(), "1".to_string()), ("y".to_string(), "2".to_string())],
        )
        .unwrap();
        let pipeline = query.pipeline();

        let project = pipeline[7].get_document("$project").unwrap();
        assert_eq!(
            project.get_document("label").unwrap(),
            &doc! { "$arrayElemAt": [["1", "2"], { "$indexOfArray": [["x", "y"], "$jockey_id"] }] }
        );
        assert_eq!(project.get_str("counterpart").unwrap(), "$horse_data.name");
    }

    #[test]
    fn test_batch_rejects_mismatched_labels() {
        let err = HistoryQuery::batch(Role::Horse, vec!["a".into(), "b".into()], vec!["1".into()]).unwrap_err();
        assert!(matches!(err, Error::Query { operation: "batch_history", .. }));

        let err = HistoryQuery::batch(Role::Horse, vec!["a".into(), "a".into()], vec!["1".into(), "2".into()]);
        assert!(err.is_err());
    }

    #[test]
    fn test_search_wildcards() {
        let filter = SearchFilter::builder(Role::Horse)
            .venue(Criterion::Exactly(String::new()))
            .surface(Criterion::Exactly(Surface::Dirt))
            .dates(NaiveDate::from_ymd_opt(2024, 1, 1), None)
            .build()
            .unwrap();
        let pipeline = filter.pipeline();
        let matched = pipeline[2].get_document("$match").unwrap();

        assert_eq!(matched.get_str("race_info.venue").unwrap(), "");
        assert_eq!(matched.get_str("race_info.surface").unwrap(), "ダ");
        assert_eq!(matched.get_document("race_info.distance").unwrap(), &doc! { "$exists": 1 });
        assert_eq!(matched.get_document("race_info.date").unwrap(), &doc! { "$gte": "2024-01-01" });
    }

    #[test]
    fn test_search_rejects_inverted_dates() {
        let result = SearchFilter::builder(Role::Trainer)
            .dates(NaiveDate::from_ymd_opt(2024, 2, 1), NaiveDate::from_ymd_opt(2024, 1, 1))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_threshold() {
        let race_id: RaceId = "202444010511".parse().unwrap();
        assert!(DuplicateQuery::new(&[race_id], Role::Horse, 0).is_err());

        let pipeline = DuplicateQuery::new(&[race_id], Role::Horse, 2).unwrap().pipeline();
        assert_eq!(pipeline[2], doc! { "$match": { "count": { "$gte": 2_i64 } } });
    }
}
