//! `/api/ice-data` handlers. Reads go through the response cache; writes
//! sweep it only after the store has accepted the change.

use axum::{
    Json,
    extract::{
        OriginalUri, Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use icelog_api_types::{
    DataEnvelope, ListEnvelope, MessageEnvelope, NewReadingPayload, ReadingListParams,
    ReadingPatchPayload,
};
use serde_json::Value;
use time::OffsetDateTime;

use crate::application::readings::{ListRequest, filter_from_params, import_rows};
use crate::domain::readings::ReadingId;

use super::{HttpState, error::ApiError};

pub const COLLECTION_PATH: &str = "/api/ice-data";

pub async fn list_readings(
    State(state): State<HttpState>,
    OriginalUri(uri): OriginalUri,
    query: Result<Query<ReadingListParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = query?;
    let request = ListRequest::from_params(&params, OffsetDateTime::now_utc())?;

    let key = state.cache.key_for(uri.path(), uri.query());
    let page = state
        .cache
        .read(&key, || state.readings.list(&request))
        .await?;

    Ok(Json(ListEnvelope::success(page.data, page.pagination)).into_response())
}

/// Count, averages and date bounds over the readings matching the same
/// region, `timeRange` and `search` parameters as the list.
pub async fn reading_stats(
    State(state): State<HttpState>,
    OriginalUri(uri): OriginalUri,
    query: Result<Query<ReadingListParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = query?;
    let spec = filter_from_params(&params, OffsetDateTime::now_utc())?;

    let key = state.cache.key_for(uri.path(), uri.query());
    let stats = state.cache.read(&key, || state.readings.stats(&spec)).await?;

    Ok(Json(DataEnvelope::success(stats)).into_response())
}

pub async fn get_reading(
    State(state): State<HttpState>,
    OriginalUri(uri): OriginalUri,
    id: Result<Path<ReadingId>, PathRejection>,
) -> Result<Response, ApiError> {
    let Path(id) = id?;

    let key = state.cache.key_for(uri.path(), uri.query());
    let reading = state.cache.read(&key, || state.readings.get(id)).await?;

    Ok(Json(DataEnvelope::success(reading)).into_response())
}

pub async fn create_reading(
    State(state): State<HttpState>,
    body: Result<Json<NewReadingPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = body?;
    let reading = state.readings.create(payload).await?;

    state
        .cache
        .invalidate(&state.cache.collection_patterns(COLLECTION_PATH))
        .await;

    Ok((StatusCode::CREATED, Json(DataEnvelope::success(reading))).into_response())
}

pub async fn update_reading(
    State(state): State<HttpState>,
    id: Result<Path<ReadingId>, PathRejection>,
    body: Result<Json<ReadingPatchPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Path(id) = id?;
    let Json(patch) = body?;
    let reading = state.readings.update(id, patch).await?;

    state
        .cache
        .invalidate(&state.cache.item_patterns(COLLECTION_PATH, id))
        .await;

    Ok(Json(DataEnvelope::success(reading)).into_response())
}

pub async fn delete_reading(
    State(state): State<HttpState>,
    id: Result<Path<ReadingId>, PathRejection>,
) -> Result<Response, ApiError> {
    let Path(id) = id?;
    state.readings.delete(id).await?;

    state
        .cache
        .invalidate(&state.cache.item_patterns(COLLECTION_PATH, id))
        .await;

    Ok(Json(MessageEnvelope::success("Reading deleted")).into_response())
}

/// Accepts `{ "data": [...] }` (or a bare array) of at most 1000 rows.
pub async fn import_readings(
    State(state): State<HttpState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(document) = body?;
    let inserted = state.readings.import(import_rows(document)).await?;

    if !inserted.is_empty() {
        state
            .cache
            .invalidate(&state.cache.collection_patterns(COLLECTION_PATH))
            .await;
    }

    Ok((StatusCode::CREATED, Json(DataEnvelope::success(inserted))).into_response())
}
