//! MongoDB storage backend

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{ClientOptions, ServerApi, ServerApiVersion};
use mongodb::{Client, Database};

use crate::types::{DeleteReceipt, UpdateReceipt, ID_FIELD};
use crate::Result;

use super::{Collection, DocumentStore, FindOptions};

/// MongoDB storage backend
///
/// The driver client is pool-backed and cheap to share, so one instance
/// serves the whole process.
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    /// Connect with the Stable API v1 and confirm the deployment answers a ping.
    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let mut options = ClientOptions::parse(uri).await?;
        options.server_api = Some(
            ServerApi::builder()
                .version(ServerApiVersion::V1)
                .strict(true)
                .deprecation_errors(true)
                .build(),
        );

        let store = Self::from_client(Client::with_options(options)?, database);

        store.ping().await?;
        tracing::info!(database, "Pinged deployment; connected to MongoDB");

        Ok(store)
    }

    /// Wrap an existing client without contacting the deployment.
    pub fn from_client(client: Client, database: &str) -> Self {
        Self {
            database: client.database(database),
            client,
        }
    }

    fn collection(&self, collection: Collection) -> mongodb::Collection<Document> {
        self.database.collection(collection.name())
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert_one(&self, collection: Collection, doc: Document) -> Result<Bson> {
        let result = self.collection(collection).insert_one(doc).await?;
        Ok(result.inserted_id)
    }

    async fn find(
        &self,
        collection: Collection,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        let coll = self.collection(collection);
        let mut action = coll.find(filter);
        if options.newest_first {
            action = action.sort(doc! { ID_FIELD: -1 });
        }
        if let Some(limit) = options.limit {
            action = action.limit(i64::from(limit));
        }

        let cursor = action.await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        Ok(docs)
    }

    async fn find_one(
        &self,
        collection: Collection,
        filter: Document,
    ) -> Result<Option<Document>> {
        Ok(self.collection(collection).find_one(filter).await?)
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: Document,
        fields: Document,
    ) -> Result<UpdateReceipt> {
        let result = self
            .collection(collection)
            .update_one(filter, doc! { "$set": fields })
            .await?;

        Ok(UpdateReceipt {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn delete_one(&self, collection: Collection, filter: Document) -> Result<DeleteReceipt> {
        let result = self.collection(collection).delete_one(filter).await?;
        Ok(DeleteReceipt {
            deleted_count: result.deleted_count,
        })
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "mongo"
    }
}
