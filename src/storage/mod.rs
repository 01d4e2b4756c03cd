//! Storage abstraction layer
//!
//! Provides a unified document-store interface over MongoDB and an
//! in-process memory backend

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};

use crate::types::{DeleteReceipt, UpdateReceipt};
use crate::Result;

pub mod memory;
pub mod mongo;

/// Collections the service reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Visas,
    Applications,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Visas => "visa",
            Collection::Applications => "applications",
        }
    }
}

/// Ordering and limit for a multi-document find
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Sort by `_id` descending, i.e. newest insert first
    pub newest_first: bool,
    pub limit: Option<u32>,
}

impl FindOptions {
    pub fn newest(limit: u32) -> Self {
        Self {
            newest_first: true,
            limit: Some(limit),
        }
    }
}

/// Document store trait
///
/// Filters are top-level equality matches. Implementations must be safe to
/// share across every in-flight request.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document, returning the identifier the store assigned
    async fn insert_one(&self, collection: Collection, doc: Document) -> Result<Bson>;

    /// Find all documents matching the filter
    async fn find(
        &self,
        collection: Collection,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>>;

    /// Find the first document matching the filter
    async fn find_one(&self, collection: Collection, filter: Document)
        -> Result<Option<Document>>;

    /// Merge `fields` into the first document matching the filter
    async fn update_one(
        &self,
        collection: Collection,
        filter: Document,
        fields: Document,
    ) -> Result<UpdateReceipt>;

    /// Delete the first document matching the filter
    async fn delete_one(&self, collection: Collection, filter: Document) -> Result<DeleteReceipt>;

    /// Round-trip to the backend to confirm it is reachable
    async fn ping(&self) -> Result<()>;

    /// Short backend name for health reporting
    fn backend(&self) -> &'static str;
}

/// Storage configuration
#[derive(Clone)]
pub enum StoreConfig {
    Mongo { uri: String, database: String },
    Memory,
}

impl StoreConfig {
    pub fn backend(&self) -> &'static str {
        match self {
            StoreConfig::Mongo { .. } => "mongo",
            StoreConfig::Memory => "memory",
        }
    }
}

/// Create storage backend from config
pub async fn create_store(config: StoreConfig) -> Result<Box<dyn DocumentStore>> {
    match config {
        StoreConfig::Mongo { uri, database } => {
            let backend = mongo::MongoStore::connect(&uri, &database).await?;
            Ok(Box::new(backend))
        }
        StoreConfig::Memory => Ok(Box::new(memory::MemoryStore::new())),
    }
}
