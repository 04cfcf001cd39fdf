//! In-process document store.
//!
//! Evaluates the subset of MongoDB filter, expression and aggregation
//! semantics the upsert store and query engine emit, so pipelines can be
//! exercised without a server. Anything outside that subset is rejected
//! with `StoreError::Unsupported` instead of being approximated.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};
use regex::Regex;
use tracing::debug;

use super::document_store::DocumentStore;
use super::schema::Collection;
use crate::error::{Error, Result, StoreError};

type Vars = HashMap<String, Bson>;
type Data = HashMap<Collection, Vec<Document>>;
type Eval<T> = std::result::Result<T, StoreError>;

#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<Data>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert documents as-is, bypassing upsert semantics.
    pub fn insert_many(&self, collection: Collection, documents: impl IntoIterator<Item = Document>) {
        self.lock().entry(collection).or_default().extend(documents);
    }

    /// Every stored document of a collection, in insertion order.
    pub fn documents(&self, collection: Collection) -> Vec<Document> {
        self.lock().get(&collection).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Data> {
        self.collections.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn matching(&self, collection: Collection, filter: &Document) -> Eval<Vec<Document>> {
        let data = self.lock();
        let mut found = Vec::new();
        for document in data.get(&collection).into_iter().flatten() {
            if matches(document, filter, &Vars::new())? {
                found.push(document.clone());
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert(&self, collection: Collection, filter: Document, fields: Document) -> Result<()> {
        let mut data = self.lock();
        let documents = data.entry(collection).or_default();

        let mut target = None;
        for (i, document) in documents.iter().enumerate() {
            if matches(document, &filter, &Vars::new()).map_err(|e| Error::store("upsert", collection.name(), e))? {
                target = Some(i);
                break;
            }
        }

        match target {
            Some(i) => {
                for (key, value) in fields {
                    documents[i].insert(key, value);
                }
            }
            None => {
                let mut document = Document::new();
                if !filter.contains_key("_id") {
                    document.insert("_id", ObjectId::new());
                }
                for (key, value) in filter {
                    if !key.starts_with('$') && !is_operator_document(&value) {
                        document.insert(key, value);
                    }
                }
                for (key, value) in fields {
                    document.insert(key, value);
                }
                documents.push(document);
            }
        }
        Ok(())
    }

    async fn count(&self, collection: Collection, filter: Document) -> Result<u64> {
        let found = self
            .matching(collection, &filter)
            .map_err(|e| Error::store("count", collection.name(), e))?;
        Ok(found.len() as u64)
    }

    async fn find_one(&self, collection: Collection, filter: Document) -> Result<Option<Document>> {
        let found = self
            .matching(collection, &filter)
            .map_err(|e| Error::store("find_one", collection.name(), e))?;
        Ok(found.into_iter().next())
    }

    async fn distinct(&self, collection: Collection, field: &str, filter: Document) -> Result<Vec<Bson>> {
        let found = self
            .matching(collection, &filter)
            .map_err(|e| Error::store("distinct", collection.name(), e))?;

        let mut values: Vec<Bson> = Vec::new();
        for document in &found {
            let candidates = match lookup_path(document, field) {
                Some(Bson::Array(items)) => items.clone(),
                Some(value) => vec![value.clone()],
                None => continue,
            };
            for value in candidates {
                if !values.iter().any(|v| values_equal(v, &value)) {
                    values.push(value);
                }
            }
        }
        Ok(values)
    }

    async fn aggregate(&self, collection: Collection, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        let data = self.lock().clone();
        let input = data.get(&collection).cloned().unwrap_or_default();
        Evaluator { data: &data }
            .run(input, &pipeline, &Vars::new())
            .map_err(|e| Error::store("aggregate", collection.name(), e))
    }

    async fn ensure_indexes(&self) -> Result<()> {
        debug!("in-memory store keeps no indexes");
        Ok(())
    }
}

fn unsupported(what: impl Into<String>) -> StoreError {
    StoreError::Unsupported(what.into())
}

struct Evaluator<'a> {
    data: &'a Data,
}

impl Evaluator<'_> {
    fn run(&self, mut documents: Vec<Document>, pipeline: &[Document], vars: &Vars) -> Eval<Vec<Document>> {
        for stage in pipeline {
            let (name, spec) = single_entry(stage)?;
            documents = match name {
                "$match" => {
                    let filter = as_document(spec, "$match")?;
                    let mut kept = Vec::with_capacity(documents.len());
                    for document in documents {
                        if matches(&document, filter, vars)? {
                            kept.push(document);
                        }
                    }
                    kept
                }
                "$lookup" => self.lookup(documents, as_document(spec, "$lookup")?, vars)?,
                "$unwind" => unwind(documents, spec)?,
                "$project" => {
                    let projection = as_document(spec, "$project")?;
                    documents
                        .iter()
                        .map(|d| project(d, projection, vars))
                        .collect::<Eval<_>>()?
                }
                "$group" => group(&documents, as_document(spec, "$group")?, vars)?,
                "$sort" => sort(documents, as_document(spec, "$sort")?)?,
                other => return Err(unsupported(format!("stage {other}"))),
            };
        }
        Ok(documents)
    }

    fn lookup(&self, documents: Vec<Document>, spec: &Document, vars: &Vars) -> Eval<Vec<Document>> {
        let from = spec.get_str("from").map_err(|_| unsupported("$lookup without `from`"))?;
        let as_field = spec.get_str("as").map_err(|_| unsupported("$lookup without `as`"))?;
        let foreign: &[Document] = Collection::ALL
            .iter()
            .find(|c| c.name() == from)
            .and_then(|c| self.data.get(c))
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut joined_documents = Vec::with_capacity(documents.len());
        for mut document in documents {
            let joined: Vec<Bson> = if let Ok(local_field) = spec.get_str("localField") {
                let foreign_field = spec
                    .get_str("foreignField")
                    .map_err(|_| unsupported("$lookup without `foreignField`"))?;
                let local = lookup_path(&document, local_field).cloned().unwrap_or(Bson::Null);
                foreign
                    .iter()
                    .filter(|f| values_equal(lookup_path(f, foreign_field).unwrap_or(&Bson::Null), &local))
                    .cloned()
                    .map(Bson::Document)
                    .collect()
            } else {
                let mut inner = Vars::new();
                if let Ok(lets) = spec.get_document("let") {
                    for (name, expression) in lets {
                        let value = eval(&document, expression, vars)?.unwrap_or(Bson::Null);
                        inner.insert(name.clone(), value);
                    }
                }
                let stages = spec
                    .get_array("pipeline")
                    .map_err(|_| unsupported("$lookup without `localField` or `pipeline`"))?
                    .iter()
                    .map(|s| as_document(s, "$lookup.pipeline").cloned())
                    .collect::<Eval<Vec<_>>>()?;
                self.run(foreign.to_vec(), &stages, &inner)?
                    .into_iter()
                    .map(Bson::Document)
                    .collect()
            };
            document.insert(as_field, Bson::Array(joined));
            joined_documents.push(document);
        }
        Ok(joined_documents)
    }
}

fn single_entry(stage: &Document) -> Eval<(&str, &Bson)> {
    let mut entries = stage.iter();
    match (entries.next(), entries.next()) {
        (Some((name, spec)), None) => Ok((name.as_str(), spec)),
        _ => Err(unsupported(format!("stage must have exactly one key: {stage}"))),
    }
}

fn as_document<'b>(value: &'b Bson, context: &str) -> Eval<&'b Document> {
    value
        .as_document()
        .ok_or_else(|| unsupported(format!("{context} expects a document")))
}

fn is_operator_document(value: &Bson) -> bool {
    matches!(value, Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')))
}

/// Value at a dotted path; `None` when any segment is missing.
fn lookup_path<'b>(document: &'b Document, path: &str) -> Option<&'b Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }
    Some(current)
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Ordering within one type bracket (numbers or strings); `None` across brackets.
fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => false,
        Bson::Boolean(b) => *b,
        other => as_f64(other).map_or(true, |v| v != 0.0),
    }
}

fn matches(document: &Document, filter: &Document, vars: &Vars) -> Eval<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$expr" => eval(document, condition, vars)?.as_ref().is_some_and(truthy),
            "$and" | "$or" => {
                let clauses = condition
                    .as_array()
                    .ok_or_else(|| unsupported(format!("{key} expects an array")))?;
                let mut results = Vec::with_capacity(clauses.len());
                for clause in clauses {
                    results.push(matches(document, as_document(clause, key)?, vars)?);
                }
                if key == "$and" {
                    results.iter().all(|r| *r)
                } else {
                    results.iter().any(|r| *r)
                }
            }
            field => field_matches(lookup_path(document, field), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> Eval<bool> {
    let Bson::Document(operators) = condition else {
        return Ok(equals_or_contains(value, condition));
    };
    if !is_operator_document(condition) {
        return Ok(equals_or_contains(value, condition));
    }

    for (operator, argument) in operators {
        let ok = match operator.as_str() {
            "$eq" => equals_or_contains(value, argument),
            "$ne" => !equals_or_contains(value, argument),
            "$in" | "$nin" => {
                let options = argument
                    .as_array()
                    .ok_or_else(|| unsupported(format!("{operator} expects an array")))?;
                let found = options.iter().any(|option| equals_or_contains(value, option));
                if operator == "$in" {
                    found
                } else {
                    !found
                }
            }
            "$gt" | "$gte" | "$lt" | "$lte" => match value.and_then(|v| compare(v, argument)) {
                Some(ordering) => match operator.as_str() {
                    "$gt" => ordering == Ordering::Greater,
                    "$gte" => ordering != Ordering::Less,
                    "$lt" => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                },
                None => false,
            },
            "$exists" => value.is_some() == truthy(argument),
            "$regex" => {
                let pattern = argument
                    .as_str()
                    .ok_or_else(|| unsupported("$regex expects a string pattern"))?;
                let case_insensitive = operators.get_str("$options").is_ok_and(|o| o.contains('i'));
                let pattern = if case_insensitive {
                    format!("(?i){pattern}")
                } else {
                    pattern.to_string()
                };
                let regex = Regex::new(&pattern).map_err(|e| unsupported(format!("$regex: {e}")))?;
                matches!(value, Some(Bson::String(s)) if regex.is_match(s))
            }
            "$options" => true,
            other => return Err(unsupported(format!("query operator {other}"))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// MongoDB equality: `null` also matches a missing field, and an array
/// field matches when any element is equal.
fn equals_or_contains(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(v) => values_equal(v, expected),
    }
}

/// Evaluate an aggregation expression; `None` is a missing value.
fn eval(document: &Document, expression: &Bson, vars: &Vars) -> Eval<Option<Bson>> {
    match expression {
        Bson::String(s) if s.starts_with("$$") => {
            let reference = &s[2..];
            let (name, path) = match reference.split_once('.') {
                Some((name, path)) => (name, Some(path)),
                None => (reference, None),
            };
            let value = vars
                .get(name)
                .ok_or_else(|| unsupported(format!("undefined variable $${name}")))?;
            Ok(match path {
                Some(path) => value.as_document().and_then(|d| lookup_path(d, path)).cloned(),
                None => Some(value.clone()),
            })
        }
        Bson::String(s) if s.starts_with('$') => Ok(lookup_path(document, &s[1..]).cloned()),
        Bson::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(document, item, vars)?.unwrap_or(Bson::Null));
            }
            Ok(Some(Bson::Array(values)))
        }
        Bson::Document(operator) if is_operator_document(expression) => eval_operator(document, operator, vars),
        Bson::Document(fields) => {
            let mut out = Document::new();
            for (key, value) in fields {
                if let Some(value) = eval(document, value, vars)? {
                    out.insert(key.clone(), value);
                }
            }
            Ok(Some(Bson::Document(out)))
        }
        literal => Ok(Some(literal.clone())),
    }
}

fn eval_operator(document: &Document, expression: &Document, vars: &Vars) -> Eval<Option<Bson>> {
    let (operator, argument) = single_entry(expression)?;
    if operator == "$literal" {
        return Ok(Some(argument.clone()));
    }

    let arguments = match eval(document, argument, vars)? {
        Some(Bson::Array(values)) => values,
        _ => return Err(unsupported(format!("{operator} expects an argument array"))),
    };

    match (operator, arguments.as_slice()) {
        ("$eq", [a, b]) => Ok(Some(Bson::Boolean(values_equal(a, b)))),
        ("$ne", [a, b]) => Ok(Some(Bson::Boolean(!values_equal(a, b)))),
        ("$and", values) => Ok(Some(Bson::Boolean(values.iter().all(truthy)))),
        ("$or", values) => Ok(Some(Bson::Boolean(values.iter().any(truthy)))),
        ("$arrayElemAt", [Bson::Array(items), index]) => {
            let index = as_f64(index).ok_or_else(|| unsupported("$arrayElemAt index must be numeric"))? as i64;
            let position = if index < 0 { items.len() as i64 + index } else { index };
            Ok(usize::try_from(position).ok().and_then(|p| items.get(p)).cloned())
        }
        ("$indexOfArray", [Bson::Array(items), needle]) => {
            let position = items.iter().position(|item| values_equal(item, needle));
            Ok(Some(Bson::Int64(position.map_or(-1, |p| p as i64))))
        }
        (other, _) => Err(unsupported(format!("expression {other} with {} argument(s)", arguments.len()))),
    }
}

fn unwind(documents: Vec<Document>, spec: &Bson) -> Eval<Vec<Document>> {
    let (path, preserve) = match spec {
        Bson::String(path) => (path.as_str(), false),
        Bson::Document(options) => (
            options
                .get_str("path")
                .map_err(|_| unsupported("$unwind without `path`"))?,
            options.get_bool("preserveNullAndEmptyArrays").unwrap_or(false),
        ),
        _ => return Err(unsupported("$unwind expects a path or options document")),
    };
    let field = path
        .strip_prefix('$')
        .filter(|f| !f.contains('.'))
        .ok_or_else(|| unsupported(format!("$unwind path {path}")))?;

    let mut unwound = Vec::with_capacity(documents.len());
    for mut document in documents {
        match document.get(field).cloned() {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = document.clone();
                    copy.insert(field, item);
                    unwound.push(copy);
                }
            }
            Some(Bson::Array(_)) => {
                if preserve {
                    document.remove(field);
                    unwound.push(document);
                }
            }
            None | Some(Bson::Null) => {
                if preserve {
                    unwound.push(document);
                }
            }
            Some(_) => unwound.push(document),
        }
    }
    Ok(unwound)
}

fn project(document: &Document, projection: &Document, vars: &Vars) -> Eval<Document> {
    let mut out = Document::new();
    if let Some(id) = document.get("_id") {
        out.insert("_id", id.clone());
    }

    for (field, specification) in projection {
        match specification {
            Bson::Boolean(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
                if !truthy(specification) {
                    if field == "_id" {
                        out.remove("_id");
                        continue;
                    }
                    return Err(unsupported(format!("exclusion of {field} in an inclusion projection")));
                }
                if field.contains('.') {
                    return Err(unsupported(format!("dotted inclusion {field}")));
                }
                if let Some(value) = document.get(field) {
                    out.insert(field.clone(), value.clone());
                }
            }
            expression => {
                if let Some(value) = eval(document, expression, vars)? {
                    out.insert(field.clone(), value);
                }
            }
        }
    }
    Ok(out)
}

fn group(documents: &[Document], spec: &Document, vars: &Vars) -> Eval<Vec<Document>> {
    let key_expression = spec.get("_id").ok_or_else(|| unsupported("$group without `_id`"))?;
    let mut groups: Vec<Document> = Vec::new();

    for document in documents {
        let key = eval(document, key_expression, vars)?.unwrap_or(Bson::Null);
        let index = match groups
            .iter()
            .position(|g| g.get("_id").is_some_and(|k| values_equal(k, &key)))
        {
            Some(index) => index,
            None => {
                let mut fresh = Document::new();
                fresh.insert("_id", key);
                groups.push(fresh);
                groups.len() - 1
            }
        };

        for (field, accumulator) in spec {
            if field == "_id" {
                continue;
            }
            let operand = as_document(accumulator, "$group accumulator")?
                .get("$sum")
                .ok_or_else(|| unsupported(format!("accumulator for {field}")))?;
            let value = eval(document, operand, vars)?.unwrap_or(Bson::Int32(0));
            let total = groups[index].get(field).cloned().unwrap_or(Bson::Int32(0));
            groups[index].insert(field.clone(), add(&total, &value));
        }
    }
    Ok(groups)
}

/// `$sum` addition: non-numeric operands count as zero.
fn add(total: &Bson, value: &Bson) -> Bson {
    match (total, value) {
        (Bson::Int32(a), Bson::Int32(b)) => a.checked_add(*b).map_or(Bson::Int64(i64::from(*a) + i64::from(*b)), Bson::Int32),
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            let a = as_f64(total).unwrap_or_default() as i64;
            let b = as_f64(value).unwrap_or_default() as i64;
            Bson::Int64(a + b)
        }
        _ => match as_f64(value) {
            Some(v) => Bson::Double(as_f64(total).unwrap_or_default() + v),
            None => total.clone(),
        },
    }
}

fn sort(mut documents: Vec<Document>, spec: &Document) -> Eval<Vec<Document>> {
    let mut keys = Vec::with_capacity(spec.len());
    for (field, direction) in spec {
        let descending = as_f64(direction).ok_or_else(|| unsupported(format!("$sort direction for {field}")))? < 0.0;
        keys.push((field.as_str(), descending));
    }

    documents.sort_by(|a, b| {
        for (field, descending) in &keys {
            let ordering = match (lookup_path(a, field), lookup_path(b, field)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
            };
            let ordering = if *descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_many(
            Collection::StartingEntry,
            vec![
                doc! { "race_id": "r1", "entry_number": 1_i64, "horse_id": "h1" },
                doc! { "race_id": "r1", "entry_number": 2_i64, "horse_id": "h2" },
                doc! { "race_id": "r2", "entry_number": 1_i64, "horse_id": "h1" },
            ],
        );
        store.insert_many(
            Collection::Result,
            vec![doc! { "race_id": "r1", "entry_number": 1_i32, "finish_position": 3_i64 }],
        );
        store.insert_many(
            Collection::PreEvent,
            vec![doc! { "_id": "r1", "name": "Cup", "date": "2024-05-01 15:30" }],
        );
        store
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_merges() {
        let store = MemoryStore::new();
        store
            .upsert(Collection::Horse, doc! { "_id": "h1" }, doc! { "name": "A" })
            .await
            .unwrap();
        store
            .upsert(Collection::Horse, doc! { "_id": "h1" }, doc! { "owner": "B" })
            .await
            .unwrap();

        let documents = store.documents(Collection::Horse);
        assert_eq!(documents, vec![doc! { "_id": "h1", "name": "A", "owner": "B" }]);
    }

    #[tokio::test]
    async fn test_upsert_on_composite_key_assigns_object_id() {
        let store = MemoryStore::new();
        store
            .upsert(
                Collection::Result,
                doc! { "race_id": "r1", "entry_number": 4_i64 },
                doc! { "time": "1:12.3" },
            )
            .await
            .unwrap();

        let stored = store.documents(Collection::Result).remove(0);
        assert!(stored.get_object_id("_id").is_ok());
        assert_eq!(stored.get_str("time").unwrap(), "1:12.3");
        assert_eq!(stored.get_i64("entry_number").unwrap(), 4);
    }

    #[tokio::test]
    async fn test_filter_operators() {
        let store = store();
        let count = |filter: Document| {
            let store = &store;
            async move { store.count(Collection::StartingEntry, filter).await.unwrap() }
        };

        assert_eq!(count(doc! { "horse_id": "h1" }).await, 2);
        assert_eq!(count(doc! { "race_id": { "$in": ["r2", "r9"] } }).await, 1);
        assert_eq!(count(doc! { "entry_number": { "$ne": 1 } }).await, 1);
        assert_eq!(count(doc! { "race_id": { "$gte": "r1", "$lte": "r1" } }).await, 2);
        assert_eq!(count(doc! { "jockey_id": { "$exists": 1 } }).await, 0);
        assert_eq!(count(doc! { "horse_id": { "$regex": "^h" } }).await, 3);
    }

    #[tokio::test]
    async fn test_lookup_unwind_project() {
        let store = store();
        let pipeline = vec![
            doc! { "$match": { "horse_id": "h1" } },
            doc! { "$lookup": { "from": "pre_event", "localField": "race_id", "foreignField": "_id", "as": "race_info" } },
            doc! { "$unwind": { "path": "$race_info", "preserveNullAndEmptyArrays": true } },
            doc! { "$lookup": {
                "from": "result",
                "let": { "race_id": "$race_id", "entry_number": "$entry_number" },
                "pipeline": [ { "$match": { "$expr": { "$and": [
                    { "$eq": ["$race_id", "$$race_id"] },
                    { "$eq": ["$entry_number", "$$entry_number"] },
                ] } } } ],
                "as": "race_results",
            } },
            doc! { "$unwind": { "path": "$race_results", "preserveNullAndEmptyArrays": true } },
            doc! { "$sort": { "race_id": 1 } },
            doc! { "$project": { "_id": 0, "race_id": 1, "name": "$race_info.name", "finish_position": "$race_results.finish_position" } },
        ];

        let rows = store.aggregate(Collection::StartingEntry, pipeline).await.unwrap();
        assert_eq!(
            rows,
            vec![
                doc! { "race_id": "r1", "name": "Cup", "finish_position": 3_i64 },
                doc! { "race_id": "r2" },
            ]
        );
    }

    #[tokio::test]
    async fn test_group_sum_and_positional_label() {
        let store = store();
        let grouped = store
            .aggregate(
                Collection::StartingEntry,
                vec![
                    doc! { "$group": { "_id": "$horse_id", "count": { "$sum": 1 } } },
                    doc! { "$match": { "count": { "$gte": 2 } } },
                ],
            )
            .await
            .unwrap();
        assert_eq!(grouped, vec![doc! { "_id": "h1", "count": 2 }]);

        let labelled = store
            .aggregate(
                Collection::StartingEntry,
                vec![
                    doc! { "$match": { "race_id": "r1" } },
                    doc! { "$project": { "_id": 0, "label": { "$arrayElemAt": [["x", "y"], { "$indexOfArray": [["h2", "h1"], "$horse_id"] }] } } },
                ],
            )
            .await
            .unwrap();
        assert_eq!(labelled, vec![doc! { "label": "y" }, doc! { "label": "x" }]);
    }

    #[tokio::test]
    async fn test_distinct_and_unsupported_stage() {
        let store = store();
        let ids = store
            .distinct(Collection::StartingEntry, "horse_id", Document::new())
            .await
            .unwrap();
        assert_eq!(ids, vec![Bson::from("h1"), Bson::from("h2")]);

        let err = store
            .aggregate(Collection::StartingEntry, vec![doc! { "$facet": {} }])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Store {
                source: StoreError::Unsupported(_),
                ..
            }
        ));
    }
}
