//! Share store
//!
//! Immutable, content-addressed query snapshots. The share id doubles as
//! the document `_id`, so inserting the same snapshot twice is naturally
//! idempotent: the caller checks existence first and a duplicate insert
//! fails on the primary key rather than duplicating data.

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::{ClientOptions, Credential};
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};
use tracing::info;

use offerd_config::ShareDbConfig;
use offerd_domain::Query;

use crate::error::Result;

const COLLECTION: &str = "queries";

/// A shared snapshot as persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEntity {
    #[serde(rename = "_id")]
    pub share_id: String,
    pub query: Query,
}

/// Durable store for shared query snapshots.
#[async_trait]
pub trait ShareRepository: Send + Sync {
    /// Whether a snapshot with this share id already exists.
    async fn exists(&self, share_id: &str) -> Result<bool>;

    /// Insert a snapshot. Ids are content hashes, so an insert for an
    /// existing id can only carry identical data.
    async fn insert(&self, entity: &QueryEntity) -> Result<()>;

    /// Load a shared snapshot.
    async fn get(&self, share_id: &str) -> Result<Option<Query>>;
}

/// MongoDB-backed share repository.
pub struct MongoShareRepository {
    collection: Collection<QueryEntity>,
}

impl MongoShareRepository {
    /// Connect to MongoDB and make sure the collection exists.
    pub async fn connect(config: &ShareDbConfig) -> Result<Self> {
        let mut options = ClientOptions::parse(&config.url).await?;
        options.credential = Some(
            Credential::builder()
                .username(config.user.clone())
                .password(config.password.clone())
                .build(),
        );

        let client = Client::with_options(options)?;
        let database = client.database(&config.name);

        let names = database.list_collection_names().await?;
        if !names.iter().any(|name| name == COLLECTION) {
            database.create_collection(COLLECTION).await?;
            info!(collection = COLLECTION, "created share collection");
        }

        info!(database = %config.name, "connected to share store");

        Ok(Self {
            collection: database.collection(COLLECTION),
        })
    }
}

#[async_trait]
impl ShareRepository for MongoShareRepository {
    async fn exists(&self, share_id: &str) -> Result<bool> {
        let count = self
            .collection
            .count_documents(doc! { "_id": share_id })
            .await?;
        Ok(count > 0)
    }

    async fn insert(&self, entity: &QueryEntity) -> Result<()> {
        self.collection.insert_one(entity).await?;
        Ok(())
    }

    async fn get(&self, share_id: &str) -> Result<Option<Query>> {
        let entity = self
            .collection
            .find_one(doc! { "_id": share_id })
            .await?;
        Ok(entity.map(|e| e.query))
    }
}
