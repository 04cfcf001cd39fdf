//! Document-store seam and its MongoDB implementation.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Database, IndexModel};
use tracing::{debug, info};

use super::schema::{Collection, INDEXES};
use crate::config::StoreConfig;
use crate::error::{Error, Result};

/// Operations the upsert store and query engine need from a document store.
///
/// Filters, updates and pipelines are MongoDB documents; implementations
/// must give them MongoDB semantics.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// `$set` the given fields on the document matching `filter`, inserting
    /// it (with the filter's equality fields) when none matches.
    async fn upsert(&self, collection: Collection, filter: Document, fields: Document) -> Result<()>;

    async fn count(&self, collection: Collection, filter: Document) -> Result<u64>;

    async fn find_one(&self, collection: Collection, filter: Document) -> Result<Option<Document>>;

    async fn distinct(&self, collection: Collection, field: &str, filter: Document) -> Result<Vec<Bson>>;

    async fn aggregate(&self, collection: Collection, pipeline: Vec<Document>) -> Result<Vec<Document>>;

    async fn ensure_indexes(&self) -> Result<()>;
}

/// MongoDB-backed store.
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let client = Client::with_uri_str(&config.uri)
            .await
            .map_err(|e| Error::store("connect", config.database.as_str(), e))?;
        info!(uri = %config.uri, database = %config.database, "connected to document store");
        Ok(Self {
            db: client.database(&config.database),
        })
    }

    fn collection(&self, collection: Collection) -> mongodb::Collection<Document> {
        self.db.collection(collection.name())
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn upsert(&self, collection: Collection, filter: Document, fields: Document) -> Result<()> {
        self.collection(collection)
            .update_one(filter, doc! { "$set": fields })
            .upsert(true)
            .await
            .map_err(|e| Error::store("upsert", collection.name(), e))?;
        Ok(())
    }

    async fn count(&self, collection: Collection, filter: Document) -> Result<u64> {
        self.collection(collection)
            .count_documents(filter)
            .await
            .map_err(|e| Error::store("count", collection.name(), e))
    }

    async fn find_one(&self, collection: Collection, filter: Document) -> Result<Option<Document>> {
        self.collection(collection)
            .find_one(filter)
            .await
            .map_err(|e| Error::store("find_one", collection.name(), e))
    }

    async fn distinct(&self, collection: Collection, field: &str, filter: Document) -> Result<Vec<Bson>> {
        self.collection(collection)
            .distinct(field, filter)
            .await
            .map_err(|e| Error::store("distinct", collection.name(), e))
    }

    async fn aggregate(&self, collection: Collection, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        let cursor = self
            .collection(collection)
            .aggregate(pipeline)
            .await
            .map_err(|e| Error::store("aggregate", collection.name(), e))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| Error::store("aggregate", collection.name(), e))
    }

    async fn ensure_indexes(&self) -> Result<()> {
        for spec in INDEXES {
            if spec.is_implicit() {
                debug!(collection = %spec.collection, index = spec.name, "served by the _id index");
                continue;
            }
            let model = IndexModel::builder()
                .keys(spec.keys_document())
                .options(IndexOptions::builder().name(spec.name.to_string()).build())
                .build();
            self.collection(spec.collection)
                .create_index(model)
                .await
                .map_err(|e| Error::store("create_index", spec.collection.name(), e))?;
            info!(collection = %spec.collection, index = spec.name, "index ensured");
        }
        Ok(())
    }
}
