//! Core types for visa-server
//!
//! Visas and applications are stored as loosely-typed BSON documents. The
//! service only names the fields it stamps or reads itself; everything else a
//! caller sends travels through as an open attribute bag.

use chrono::Utc;
use mongodb::bson::{self, oid::ObjectId, Bson, Document};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Field holding the store identifier of every document
pub const ID_FIELD: &str = "_id";

/// Field names stamped by the server
pub mod fields {
    pub const ADDED_BY: &str = "addedBy";
    pub const ADDED_DATE: &str = "addedDate";
    pub const APPLIED_DATE: &str = "appliedDate";
    pub const EMAIL: &str = "email";
    pub const VISA_ID: &str = "visaId";
    pub const VISA_DETAILS: &str = "visaDetails";
}

/// Parse a 24-character hex store identifier.
pub fn parse_object_id(raw: &str) -> Result<ObjectId> {
    ObjectId::parse_str(raw.trim())
        .map_err(|_| Error::InvalidId(format!("'{}' is not a valid identifier", raw)))
}

/// Current time with the millisecond precision the store keeps.
pub fn server_timestamp() -> bson::DateTime {
    bson::DateTime::from_millis(Utc::now().timestamp_millis())
}

/// Convert a JSON object from a request body into a BSON document.
pub fn json_object_to_document(map: Map<String, Value>) -> Result<Document> {
    bson::to_document(&map)
        .map_err(|e| Error::invalid_request(format!("body cannot be stored: {}", e)))
}

/// Visa listing about to be inserted: caller attributes plus the server stamps.
#[derive(Debug, Clone)]
pub struct NewVisa {
    pub attributes: Map<String, Value>,
    pub added_by: String,
    pub added_date: bson::DateTime,
}

impl NewVisa {
    pub fn new(attributes: Map<String, Value>, added_by: impl Into<String>) -> Self {
        Self {
            attributes,
            added_by: added_by.into(),
            added_date: server_timestamp(),
        }
    }

    /// Build the stored document. A caller-supplied `_id` is discarded so the
    /// store always assigns the identifier.
    pub fn into_document(self) -> Result<Document> {
        let mut attributes = self.attributes;
        attributes.remove(ID_FIELD);

        let mut doc = json_object_to_document(attributes)?;
        doc.insert(fields::ADDED_BY, self.added_by);
        doc.insert(fields::ADDED_DATE, self.added_date);
        Ok(doc)
    }
}

/// Body of `POST /apply-visa`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub fee: Value,
    pub visa_id: String,
}

impl ApplyRequest {
    /// Build the stored application document with the given timestamp.
    pub fn into_document(self, applied_date: bson::DateTime) -> Result<Document> {
        let fee = bson::to_bson(&self.fee)
            .map_err(|e| Error::invalid_request(format!("fee cannot be stored: {}", e)))?;

        let mut doc = Document::new();
        doc.insert(fields::EMAIL, self.email);
        doc.insert("firstName", self.first_name);
        doc.insert("lastName", self.last_name);
        doc.insert("fee", fee);
        doc.insert(fields::APPLIED_DATE, applied_date);
        doc.insert(fields::VISA_ID, self.visa_id.trim());
        Ok(doc)
    }
}

/// Body of `DELETE /cancel-visa-application`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub application_id: String,
}

/// Acknowledgement of an insert, shaped like the driver's result object
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InsertReceipt {
    pub acknowledged: bool,
    pub inserted_id: Value,
}

impl InsertReceipt {
    pub fn new(inserted_id: Bson) -> Self {
        Self {
            acknowledged: true,
            inserted_id: bson_to_json(inserted_id),
        }
    }
}

/// Outcome of a single-document update
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReceipt {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Outcome of a single-document delete
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReceipt {
    pub deleted_count: u64,
}

/// Render a stored document as JSON.
///
/// Identifiers become their hex form and timestamps RFC 3339 strings, which
/// is what browser clients expect to read back.
pub fn document_to_json(doc: Document) -> Value {
    Value::Object(
        doc.into_iter()
            .map(|(key, value)| (key, bson_to_json(value)))
            .collect(),
    )
}

pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(s) => Value::String(s),
            Err(_) => Value::from(dt.timestamp_millis()),
        },
        Bson::Document(doc) => document_to_json(doc),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::String(s) => Value::String(s),
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::from(i),
        Bson::Int64(i) => Value::from(i),
        Bson::Double(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Bson::Null | Bson::Undefined => Value::Null,
        other => other.into_relaxed_extjson(),
    }
}
