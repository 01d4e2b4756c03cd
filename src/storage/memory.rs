//! In-process storage backend

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, Bson, Document};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::types::{DeleteReceipt, UpdateReceipt, ID_FIELD};
use crate::Result;

use super::{Collection, DocumentStore, FindOptions};

/// In-memory document store
///
/// Keeps insertion order per collection and generates ObjectIds the same
/// way the server does, so `_id` ordering tracks insertion order.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently held in a collection
    pub async fn len(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .await
            .get(&collection)
            .map_or(0, Vec::len)
    }

    pub async fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection).await == 0
    }
}

fn filter_matches(doc: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, expected)| doc.get(key) == Some(expected))
}

fn compare_ids(a: &Document, b: &Document) -> Ordering {
    match (a.get(ID_FIELD), b.get(ID_FIELD)) {
        (Some(Bson::ObjectId(a)), Some(Bson::ObjectId(b))) => a.bytes().cmp(&b.bytes()),
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one(&self, collection: Collection, mut doc: Document) -> Result<Bson> {
        let id = match doc.get(ID_FIELD) {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                doc.insert(ID_FIELD, id.clone());
                id
            }
        };

        self.collections
            .write()
            .await
            .entry(collection)
            .or_default()
            .push(doc);

        Ok(id)
    }

    async fn find(
        &self,
        collection: Collection,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        let mut docs: Vec<Document> = collections
            .get(&collection)
            .map(|docs| docs.iter().filter(|d| filter_matches(d, &filter)).cloned().collect())
            .unwrap_or_default();

        if options.newest_first {
            docs.sort_by(|a, b| compare_ids(b, a));
        }
        if let Some(limit) = options.limit {
            docs.truncate(limit as usize);
        }

        Ok(docs)
    }

    async fn find_one(
        &self,
        collection: Collection,
        filter: Document,
    ) -> Result<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.iter().find(|d| filter_matches(d, &filter)).cloned()))
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: Document,
        fields: Document,
    ) -> Result<UpdateReceipt> {
        let mut collections = self.collections.write().await;
        let Some(doc) = collections
            .get_mut(&collection)
            .and_then(|docs| docs.iter_mut().find(|d| filter_matches(d, &filter)))
        else {
            return Ok(UpdateReceipt::default());
        };

        let mut modified = false;
        for (key, value) in fields {
            if doc.get(&key) != Some(&value) {
                doc.insert(key, value);
                modified = true;
            }
        }

        Ok(UpdateReceipt {
            matched_count: 1,
            modified_count: u64::from(modified),
        })
    }

    async fn delete_one(&self, collection: Collection, filter: Document) -> Result<DeleteReceipt> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(&collection) else {
            return Ok(DeleteReceipt::default());
        };

        match docs.iter().position(|d| filter_matches(d, &filter)) {
            Some(index) => {
                docs.remove(index);
                Ok(DeleteReceipt { deleted_count: 1 })
            }
            None => Ok(DeleteReceipt::default()),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
