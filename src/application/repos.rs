//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use icelog_api_types::{NewReadingPayload, ReadingPatchPayload};
use thiserror::Error;

use crate::application::filter::QueryPlan;
use crate::domain::{
    error::DomainError,
    readings::{Reading, ReadingId, ReadingStats},
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("resource not found")]
    NotFound,
    #[error("{reason}")]
    Validation { row: Option<usize>, reason: String },
    #[error("update contains no mutable field")]
    EmptyUpdate,
    #[error("batch of {size} rows exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },
    #[error("store connection failed: {0}")]
    Connection(String),
    #[error("store rejected credentials: {0}")]
    Authorization(String),
    #[error("store database is missing: {0}")]
    MissingDatabase(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn validation(err: &DomainError) -> Self {
        Self::Validation {
            row: None,
            reason: err.to_string(),
        }
    }

    pub fn row_validation(row: usize, err: &DomainError) -> Self {
        Self::Validation {
            row: Some(row),
            reason: format!("row {row}: {err}"),
        }
    }
}

/// Persistence contract for sensor readings.
///
/// Mutating operations validate their input before touching the store;
/// `insert_many` validates every row first and commits all rows or none.
#[async_trait]
pub trait ReadingsRepo: Send + Sync {
    async fn find(&self, plan: &QueryPlan) -> Result<Vec<Reading>, RepoError>;

    async fn count(&self, plan: &QueryPlan) -> Result<u64, RepoError>;

    /// Count, averages and timestamp bounds over the rows matching `plan`.
    async fn stats(&self, plan: &QueryPlan) -> Result<ReadingStats, RepoError>;

    async fn find_by_id(&self, id: ReadingId) -> Result<Option<Reading>, RepoError>;

    async fn insert(&self, payload: NewReadingPayload) -> Result<Reading, RepoError>;

    async fn update(
        &self,
        id: ReadingId,
        patch: ReadingPatchPayload,
    ) -> Result<Option<Reading>, RepoError>;

    async fn remove(&self, id: ReadingId) -> Result<Option<Reading>, RepoError>;

    async fn insert_many(&self, payloads: Vec<NewReadingPayload>)
    -> Result<Vec<Reading>, RepoError>;
}

