//! Visa and application operations
//!
//! Every operation is a single pass through the document store, with the
//! input checks the HTTP contract requires done up front. Nothing here is
//! transactional: apply checks the referenced visa and then inserts, and the
//! visa can disappear in between. Reads that join applications to visas
//! tolerate that by reporting the visa as absent.

use futures::{stream, StreamExt, TryStreamExt};
use mongodb::bson::{doc, Document};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::storage::{Collection, DocumentStore, FindOptions};
use crate::types::fields::{ADDED_BY, EMAIL};
use crate::types::{
    document_to_json, fields, json_object_to_document, parse_object_id, server_timestamp,
    ApplyRequest, DeleteReceipt, InsertReceipt, NewVisa, UpdateReceipt, ID_FIELD,
};
use crate::{Error, Result};

/// Header carrying the caller's identity, taken at face value
pub const IDENTITY_HEADER: &str = "user-email";

/// Number of visas returned by the latest-visas listing
pub const LATEST_VISAS_LIMIT: u32 = 6;

/// Default cap on concurrent visa lookups while joining applications
pub const DEFAULT_JOIN_CONCURRENCY: usize = 16;

/// An application together with the visa it references, if that visa still exists
#[derive(Debug, Clone)]
pub struct ApplicationWithVisa {
    pub application: Document,
    pub visa: Option<Document>,
}

impl ApplicationWithVisa {
    /// Render as the application's fields plus a `visaDetails` entry.
    pub fn into_json(self) -> Value {
        let mut value = document_to_json(self.application);
        if let Value::Object(map) = &mut value {
            map.insert(
                fields::VISA_DETAILS.to_string(),
                self.visa.map(document_to_json).unwrap_or(Value::Null),
            );
        }
        value
    }
}

/// Result of a successful application
#[derive(Debug, Clone)]
pub struct Submitted {
    pub application: Document,
    pub receipt: InsertReceipt,
}

/// Visa service over a shared document store
#[derive(Clone)]
pub struct VisaService {
    store: Arc<dyn DocumentStore>,
    join_concurrency: usize,
}

impl VisaService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            join_concurrency: DEFAULT_JOIN_CONCURRENCY,
        }
    }

    /// Bound the visa lookups issued concurrently by [`Self::applications_for`].
    pub fn with_join_concurrency(mut self, limit: usize) -> Self {
        self.join_concurrency = limit.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Insert a visa stamped with the caller's identity and the server time.
    pub async fn create_visa(
        &self,
        added_by: Option<&str>,
        attributes: Map<String, Value>,
    ) -> Result<InsertReceipt> {
        let added_by = added_by
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(Error::MissingIdentity(IDENTITY_HEADER))?;

        let doc = NewVisa::new(attributes, added_by).into_document()?;
        let id = self.store.insert_one(Collection::Visas, doc).await?;
        tracing::debug!(%added_by, "Visa created");

        Ok(InsertReceipt::new(id))
    }

    pub async fn list_visas(&self) -> Result<Vec<Document>> {
        self.store
            .find(Collection::Visas, Document::new(), FindOptions::default())
            .await
    }

    pub async fn get_visa(&self, id: &str) -> Result<Document> {
        let oid = parse_object_id(id)?;
        self.store
            .find_one(Collection::Visas, doc! { ID_FIELD: oid })
            .await?
            .ok_or_else(|| Error::not_found("Visa not found"))
    }

    /// Newest visas by descending `_id`
    pub async fn latest_visas(&self) -> Result<Vec<Document>> {
        self.store
            .find(
                Collection::Visas,
                Document::new(),
                FindOptions::newest(LATEST_VISAS_LIMIT),
            )
            .await
    }

    pub async fn visas_added_by(&self, email: Option<&str>) -> Result<Vec<Document>> {
        let email = required_email(email)?;
        self.store
            .find(
                Collection::Visas,
                doc! { ADDED_BY: email },
                FindOptions::default(),
            )
            .await
    }

    pub async fn delete_visa(&self, id: &str) -> Result<DeleteReceipt> {
        let oid = parse_object_id(id)?;
        let receipt = self
            .store
            .delete_one(Collection::Visas, doc! { ID_FIELD: oid })
            .await?;

        if receipt.deleted_count == 0 {
            return Err(Error::not_found("Visa not found"));
        }
        tracing::debug!(%oid, "Visa deleted");
        Ok(receipt)
    }

    /// Merge the given fields into an existing visa.
    pub async fn update_visa(
        &self,
        id: &str,
        changes: Map<String, Value>,
    ) -> Result<UpdateReceipt> {
        let oid = parse_object_id(id)?;
        if changes.is_empty() {
            return Err(Error::invalid_request(
                "Update body must contain at least one field",
            ));
        }
        if changes.contains_key(ID_FIELD) {
            return Err(Error::invalid_request("Field '_id' cannot be updated"));
        }
        // Only top-level fields: `$set` would read these as paths or operators
        if let Some(key) = changes
            .keys()
            .find(|k| k.contains('.') || k.starts_with('$'))
        {
            return Err(Error::invalid_request(format!(
                "Field name '{}' may not contain '.' or start with '$'",
                key
            )));
        }

        let update = json_object_to_document(changes)?;
        let receipt = self
            .store
            .update_one(Collection::Visas, doc! { ID_FIELD: oid }, update)
            .await?;

        if receipt.matched_count == 0 {
            return Err(Error::not_found("Visa not found"));
        }
        Ok(receipt)
    }

    /// Record an application after confirming the referenced visa exists.
    pub async fn apply(&self, request: ApplyRequest) -> Result<Submitted> {
        let visa_id = parse_object_id(&request.visa_id)?;

        let visa = self
            .store
            .find_one(Collection::Visas, doc! { ID_FIELD: visa_id })
            .await?;
        if visa.is_none() {
            return Err(Error::not_found("Visa not found"));
        }

        let mut application = request.into_document(server_timestamp())?;
        let id = self
            .store
            .insert_one(Collection::Applications, application.clone())
            .await?;
        application.insert(ID_FIELD, id.clone());
        tracing::debug!(%visa_id, "Application submitted");

        Ok(Submitted {
            application,
            receipt: InsertReceipt::new(id),
        })
    }

    /// Applications made with `email`, each joined to its visa.
    ///
    /// Lookups run concurrently up to the configured limit; the output keeps
    /// the order the store returned the applications in.
    pub async fn applications_for(
        &self,
        email: Option<&str>,
    ) -> Result<Vec<ApplicationWithVisa>> {
        let email = required_email(email)?;
        let applications = self
            .store
            .find(
                Collection::Applications,
                doc! { EMAIL: email },
                FindOptions::default(),
            )
            .await?;

        stream::iter(applications)
            .map(|application| async move {
                let visa = self.referenced_visa(&application).await?;
                Ok::<_, Error>(ApplicationWithVisa { application, visa })
            })
            .buffered(self.join_concurrency)
            .try_collect()
            .await
    }

    pub async fn cancel_application(&self, application_id: &str) -> Result<DeleteReceipt> {
        let oid = parse_object_id(application_id)?;
        let receipt = self
            .store
            .delete_one(Collection::Applications, doc! { ID_FIELD: oid })
            .await?;

        if receipt.deleted_count == 0 {
            return Err(Error::not_found(
                "Failed to cancel application: no matching application",
            ));
        }
        Ok(receipt)
    }

    /// A reference that no longer resolves, or never parsed, yields `None`.
    async fn referenced_visa(&self, application: &Document) -> Result<Option<Document>> {
        let Some(oid) = application
            .get_str(fields::VISA_ID)
            .ok()
            .and_then(|raw| parse_object_id(raw).ok())
        else {
            return Ok(None);
        };

        self.store
            .find_one(Collection::Visas, doc! { ID_FIELD: oid })
            .await
    }
}

fn required_email(email: Option<&str>) -> Result<&str> {
    email
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::invalid_request("email query parameter is required"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use serde_json::json;

    fn service() -> (VisaService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (VisaService::new(store.clone()), store)
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_requires_identity() {
        let (service, store) = service();

        for identity in [None, Some(""), Some("   ")] {
            let err = service
                .create_visa(identity, object(json!({ "country": "JP" })))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::MissingIdentity(IDENTITY_HEADER)));
        }
        assert!(store.is_empty(Collection::Visas).await);
    }

    #[tokio::test]
    async fn test_update_rejects_empty_and_id_changes() {
        let (service, _store) = service();
        let receipt = service
            .create_visa(Some("a@x.com"), object(json!({ "country": "JP" })))
            .await
            .unwrap();
        let id = receipt.inserted_id.as_str().unwrap().to_string();

        let err = service.update_visa(&id, Map::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        let err = service
            .update_visa(&id, object(json!({ "_id": "x" })))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        for key in ["a.b", "$inc"] {
            let mut changes = Map::new();
            changes.insert(key.to_string(), json!(1));
            let err = service.update_visa(&id, changes).await.unwrap_err();
            assert!(matches!(err, Error::InvalidRequest(_)), "{key} accepted");
        }

        let visa = service.get_visa(&id).await.unwrap();
        assert_eq!(visa.get_str("country").unwrap(), "JP");
        assert!(visa.get("a.b").is_none());
        assert!(visa.get("a").is_none());
    }

    #[tokio::test]
    async fn test_join_tolerates_unparseable_reference() {
        let (service, store) = service();
        store
            .insert_one(
                Collection::Applications,
                doc! { "email": "c@x.com", "visaId": "garbage" },
            )
            .await
            .unwrap();

        let joined = service
            .with_join_concurrency(0)
            .applications_for(Some("c@x.com"))
            .await
            .unwrap();

        assert_eq!(joined.len(), 1);
        assert!(joined[0].visa.is_none());
        assert_eq!(joined[0].clone().into_json()["visaDetails"], Value::Null);
    }
}
