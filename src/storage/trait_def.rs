use crate::analytics::models::{DistinctField, GroupCount, GroupField, Window};
use crate::cursor::CursorData;
use crate::models::{NewVisit, VisitEvent};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Append-only store of visit records.
///
/// All window bounds are half-open `[start_ms, end_ms)` over `visit_time`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Persist a classified visit and return its id
    async fn insert_visit(&self, visit: &NewVisit) -> StorageResult<i64>;

    /// Fill in the response fields of a visit.
    ///
    /// Applies only while both fields are still null. Returns false when the
    /// record is gone or was already patched.
    async fn patch_response(
        &self,
        id: i64,
        status_code: i32,
        response_time_ms: i64,
    ) -> StorageResult<bool>;

    /// Get a single visit by id
    async fn get_visit(&self, id: i64) -> StorageResult<Option<VisitEvent>>;

    /// Most recent `visit_time` recorded for an IP address
    async fn latest_visit_time_by_ip(&self, ip_address: &str) -> StorageResult<Option<i64>>;

    async fn count_visits(&self, window: &Window) -> StorageResult<i64>;

    async fn count_distinct(&self, field: DistinctField, window: &Window) -> StorageResult<i64>;

    async fn count_new_visitors(&self, window: &Window) -> StorageResult<i64>;

    /// Count visits whose patched status code is at least `status_code`
    async fn count_status_at_least(&self, window: &Window, status_code: i32)
        -> StorageResult<i64>;

    /// Visit counts grouped by a column, descending by count.
    /// Ties are broken by dimension ascending so results are stable.
    async fn group_counts(
        &self,
        field: GroupField,
        window: &Window,
        limit: Option<i64>,
    ) -> StorageResult<Vec<GroupCount>>;

    /// Mean of non-null response times, None when there are none
    async fn avg_response_time(&self, window: &Window) -> StorageResult<Option<f64>>;

    /// Newest-first listing, continuing strictly after `before` when given
    async fn recent_visits(
        &self,
        limit: i64,
        before: Option<&CursorData>,
    ) -> StorageResult<Vec<VisitEvent>>;
}
