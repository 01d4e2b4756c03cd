//! API handlers

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mongodb::bson::Document;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::api::{ApiError, AppState};
use crate::service::IDENTITY_HEADER;
use crate::types::{document_to_json, ApplyRequest, CancelRequest, InsertReceipt};
use crate::Error;

type ApiResult<T> = std::result::Result<T, ApiError>;

fn documents_to_json(docs: Vec<Document>) -> Json<Vec<Value>> {
    Json(docs.into_iter().map(document_to_json).collect())
}

/// Root banner
pub async fn root() -> &'static str {
    "Visa processing"
}

/// Health check with store status
pub async fn health(State(state): State<AppState>) -> Response {
    let backend = state.store().backend();
    match state.store().ping().await {
        Ok(()) => Json(HealthResponse::new("healthy", backend)).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, backend, "Health check ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse::new("unavailable", backend)),
            )
                .into_response()
        }
    }
}

/// Health check served when the store never connected
pub async fn health_offline() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(HealthResponse::new("unavailable", "none")),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backend: &'static str,
}

impl HealthResponse {
    fn new(status: &'static str, backend: &'static str) -> Self {
        Self {
            status,
            version: env!("CARGO_PKG_VERSION"),
            backend,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Create a visa owned by the identity header
pub async fn create_visa(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<InsertReceipt>)> {
    const CONTEXT: &str = "Error adding visa";

    // Identity is checked before the body so a bad request never reaches the store
    let identity = headers
        .get(IDENTITY_HEADER)
        .and_then(|value| value.to_str().ok());
    if identity.map_or(true, |s| s.trim().is_empty()) {
        return Err(ApiError::from_service(
            Error::MissingIdentity(IDENTITY_HEADER),
            CONTEXT,
        ));
    }

    let Json(attributes) = payload?;
    let receipt = state
        .service
        .create_visa(identity, attributes)
        .await
        .map_err(|e| ApiError::from_service(e, CONTEXT))?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

/// List every visa
pub async fn list_visas(State(state): State<AppState>) -> ApiResult<Json<Vec<Value>>> {
    let visas = state
        .service
        .list_visas()
        .await
        .map_err(|e| ApiError::from_service(e, "Error fetching visas"))?;

    Ok(documents_to_json(visas))
}

/// Fetch one visa by id
///
/// A malformed id is reported like any other lookup failure.
pub async fn get_visa(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    const CONTEXT: &str = "Error fetching visa by ID";

    let visa = state.service.get_visa(&id).await.map_err(|e| match e {
        Error::InvalidId(_) => ApiError::backend(e, CONTEXT),
        other => ApiError::from_service(other, CONTEXT),
    })?;

    Ok(Json(document_to_json(visa)))
}

/// Newest visas
pub async fn latest_visas(State(state): State<AppState>) -> ApiResult<Json<Vec<Value>>> {
    let visas = state
        .service
        .latest_visas()
        .await
        .map_err(|e| ApiError::from_service(e, "Internal server error"))?;

    Ok(documents_to_json(visas))
}

/// Visas added by the given email
pub async fn my_added_visas(
    State(state): State<AppState>,
    query: Result<Query<EmailQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Value>>> {
    let Query(query) = query?;
    let visas = state
        .service
        .visas_added_by(query.email.as_deref())
        .await
        .map_err(|e| ApiError::from_service(e, "Error fetching added visas"))?;

    Ok(documents_to_json(visas))
}

/// Delete a visa by id
pub async fn delete_visa(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .service
        .delete_visa(&id)
        .await
        .map_err(|e| ApiError::from_service(e, "Error deleting visa"))?;

    Ok(Json(MessageResponse {
        message: "Visa deleted successfully",
    }))
}

/// Merge fields into a visa
pub async fn update_visa(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(changes) = payload?;
    state
        .service
        .update_visa(&id, changes)
        .await
        .map_err(|e| ApiError::from_service(e, "Error updating visa"))?;

    Ok(Json(MessageResponse {
        message: "Visa updated successfully",
    }))
}

/// Apply for a visa
pub async fn apply_visa(
    State(state): State<AppState>,
    payload: Result<Json<ApplyRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(request) = payload?;
    let submitted = state
        .service
        .apply(request)
        .await
        .map_err(|e| ApiError::from_service(e, "Error submitting application"))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Application submitted successfully",
            "application": document_to_json(submitted.application),
            "result": submitted.receipt,
        })),
    ))
}

/// Applications for the given email, each with its visa attached
pub async fn my_visa_applications(
    State(state): State<AppState>,
    query: Result<Query<EmailQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Value>>> {
    let Query(query) = query?;
    let joined = state
        .service
        .applications_for(query.email.as_deref())
        .await
        .map_err(|e| ApiError::from_service(e, "Error fetching applications"))?;

    Ok(Json(joined.into_iter().map(|a| a.into_json()).collect()))
}

/// Cancel an application by id
pub async fn cancel_visa_application(
    State(state): State<AppState>,
    payload: Result<Json<CancelRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(request) = payload?;
    state
        .service
        .cancel_application(&request.application_id)
        .await
        .map_err(|e| ApiError::from_service(e, "Error cancelling application"))?;

    Ok(Json(MessageResponse {
        message: "Application cancelled successfully",
    }))
}
