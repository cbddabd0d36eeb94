//! Reading use-cases: list/get/create/update/delete and batch import.

use std::sync::Arc;

use icelog_api_types::{
    NewReadingPayload, Pagination, ReadingListParams, ReadingPatchPayload, TimestampInput,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::{Duration, OffsetDateTime, Time};
use tracing::info;

use crate::application::{
    filter::{FilterError, FilterSpec, compile},
    pagination::{NormalizedPage, normalize},
    repos::{ReadingsRepo, RepoError},
};
use crate::domain::{
    readings::{Reading, ReadingId, ReadingStats},
    timestamp::Timestamp,
};

/// Hard ceiling on rows accepted by one batch import.
pub const MAX_BATCH_ROWS: usize = 1000;

/// Fields matched by the free-text `search` parameter.
const SEARCH_FIELDS: [&str; 2] = ["region", "collector"];

#[derive(Debug, Error)]
pub enum ReadingError {
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingPage {
    pub data: Vec<Reading>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Today,
    Week,
    Month,
}

impl TimeRange {
    pub fn parse(raw: &str) -> Result<Self, FilterError> {
        match raw.trim() {
            "today" => Ok(TimeRange::Today),
            "week" => Ok(TimeRange::Week),
            "month" => Ok(TimeRange::Month),
            other => Err(FilterError::UnknownTimeRange(other.to_string())),
        }
    }

    /// Earliest instant covered by the range, relative to `now` (UTC).
    pub fn start(self, now: OffsetDateTime) -> OffsetDateTime {
        match self {
            TimeRange::Today => now.replace_time(Time::MIDNIGHT),
            TimeRange::Week => now - Duration::days(7),
            TimeRange::Month => now - Duration::days(30),
        }
    }
}

/// A validated list request: what to match and which page to return.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRequest {
    pub spec: FilterSpec,
    pub page: NormalizedPage,
}

impl ListRequest {
    pub fn from_params(params: &ReadingListParams, now: OffsetDateTime) -> Result<Self, FilterError> {
        let spec = filter_from_params(params, now)?;
        let page = normalize(
            params.page.as_deref(),
            params.limit.as_deref(),
            params.sort_key.as_deref(),
            params.sort_order.as_deref(),
        )?;

        Ok(Self { spec, page })
    }
}

/// Region, `timeRange` and `search` parameters as a filter; paging and
/// sorting parameters are not consulted.
pub fn filter_from_params(
    params: &ReadingListParams,
    now: OffsetDateTime,
) -> Result<FilterSpec, FilterError> {
    let mut spec = FilterSpec::new();

    if let Some(region) = non_blank(&params.region) {
        spec = spec.equals("region", region);
    }
    if let Some(range) = non_blank(&params.time_range) {
        let start = TimeRange::parse(range)?.start(now);
        spec = spec.since(TimestampInput::Text(Timestamp::from_offset(start).to_string()));
    }
    if let Some(search) = non_blank(&params.search) {
        spec = spec.any_contains(SEARCH_FIELDS.map(|field| (field, search)));
    }

    Ok(spec)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

#[derive(Clone)]
pub struct ReadingService {
    repo: Arc<dyn ReadingsRepo>,
}

impl ReadingService {
    pub fn new(repo: Arc<dyn ReadingsRepo>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, request: &ListRequest) -> Result<ReadingPage, ReadingError> {
        let plan = compile(&request.spec)?.with_order(request.page.order);
        let total = self.repo.count(&plan).await?;
        let data = self
            .repo
            .find(&plan.with_window(request.page.window))
            .await?;

        Ok(ReadingPage {
            data,
            pagination: Pagination::new(total, request.page.page, request.page.window.limit),
        })
    }

    pub async fn stats(&self, spec: &FilterSpec) -> Result<ReadingStats, ReadingError> {
        let plan = compile(spec)?;
        Ok(self.repo.stats(&plan).await?)
    }

    pub async fn get(&self, id: ReadingId) -> Result<Reading, ReadingError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(ReadingError::Repo(RepoError::NotFound))
    }

    pub async fn create(&self, payload: NewReadingPayload) -> Result<Reading, ReadingError> {
        let reading = self.repo.insert(payload).await?;
        info!(
            target = "icelog::application::readings",
            reading_id = reading.id,
            region = %reading.region,
            "reading created"
        );
        Ok(reading)
    }

    pub async fn update(
        &self,
        id: ReadingId,
        patch: ReadingPatchPayload,
    ) -> Result<Reading, ReadingError> {
        let reading = self
            .repo
            .update(id, patch)
            .await?
            .ok_or(ReadingError::Repo(RepoError::NotFound))?;
        info!(
            target = "icelog::application::readings",
            reading_id = reading.id,
            "reading updated"
        );
        Ok(reading)
    }

    pub async fn delete(&self, id: ReadingId) -> Result<Reading, ReadingError> {
        let reading = self
            .repo
            .remove(id)
            .await?
            .ok_or(ReadingError::Repo(RepoError::NotFound))?;
        info!(
            target = "icelog::application::readings",
            reading_id = reading.id,
            "reading deleted"
        );
        Ok(reading)
    }

    /// Insert a JSON array of readings atomically.
    ///
    /// The size ceiling is checked before any row is decoded; rows that fail
    /// to decode are reported with their 1-based index.
    pub async fn import(&self, rows: Value) -> Result<Vec<Reading>, ReadingError> {
        let payloads = decode_batch(rows)?;
        let inserted = self.repo.insert_many(payloads).await?;
        info!(
            target = "icelog::application::readings",
            rows = inserted.len(),
            "batch imported"
        );
        Ok(inserted)
    }
}

/// Unwrap an import document: either a bare array or `{ "data": [...] }`.
pub fn import_rows(document: Value) -> Value {
    match document {
        Value::Object(mut object) => object.remove("data").unwrap_or(Value::Null),
        other => other,
    }
}

fn decode_batch(rows: Value) -> Result<Vec<NewReadingPayload>, RepoError> {
    let Value::Array(rows) = rows else {
        return Err(RepoError::Validation {
            row: None,
            reason: "data must be an array".to_string(),
        });
    };

    if rows.len() > MAX_BATCH_ROWS {
        return Err(RepoError::BatchTooLarge {
            size: rows.len(),
            limit: MAX_BATCH_ROWS,
        });
    }

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            serde_json::from_value::<NewReadingPayload>(row).map_err(|err| {
                RepoError::Validation {
                    row: Some(index + 1),
                    reason: format!("row {}: {err}", index + 1),
                }
            })
        })
        .collect()
}
