//! Data-access contracts (spec §4.6) and their implementations.
//!
//! `memory` holds a `HashMap`-backed fake of every trait below, used as the
//! default test double (grounded in the teacher's preference for hand-rolled
//! fakes — `cloudllm` has no `mockall` dependency even though some of the
//! *other* pack repos do). `sqlx_backend` holds the Postgres/SQLite-backed
//! production implementation.

pub mod memory;
pub mod sqlx_backend;
pub mod transient;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::model::*;

/// Pagination input shared by every paginated list endpoint (spec §6.1).
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page_number: u32,
    pub page_size: u32,
}

impl Pagination {
    /// `pageSize > 100` clamped to 100; `pageNumber < 1` rejected (spec §8).
    pub fn normalize(page_number: u32, page_size: u32) -> Result<Self, GatewayError> {
        if page_number < 1 {
            return Err(GatewayError::BadRequest(
                "pageNumber must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            page_number,
            page_size: page_size.min(100).max(1),
        })
    }

    pub fn offset(&self) -> u32 {
        (self.page_number - 1) * self.page_size
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total_count: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self, page_size: u32) -> u64 {
        if page_size == 0 {
            0
        } else {
            self.total_count.div_ceil(page_size as u64)
        }
    }
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: Session) -> Result<Session, GatewayError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Session>, GatewayError>;
    async fn find_by_external_context(
        &self,
        user_id: &str,
        external_context_id: &str,
    ) -> Result<Option<Session>, GatewayError>;
    async fn find_by_user(
        &self,
        user_id: &str,
        pagination: Pagination,
        project_id: Option<&str>,
    ) -> Result<Page<Session>, GatewayError>;
    async fn search(
        &self,
        user_id: &str,
        query: &str,
        project_id: Option<&str>,
        pagination: Pagination,
    ) -> Result<Page<Session>, GatewayError>;
    async fn update_name(&self, id: &str, name: &str) -> Result<Session, GatewayError>;
    async fn move_to_project(
        &self,
        id: &str,
        project_id: Option<&str>,
    ) -> Result<Session, GatewayError>;
    async fn touch_updated_time(&self, id: &str) -> Result<(), GatewayError>;
    /// Idempotent: a second call on an already-deleted session returns
    /// `false` (spec §8).
    async fn soft_delete(&self, id: &str) -> Result<bool, GatewayError>;
    /// Marks a session as a compression branch and records its metadata
    /// (spec §4.5 "Compress-and-branch" step 3).
    async fn set_compression_metadata(
        &self,
        id: &str,
        metadata: crate::model::CompressionMetadata,
    ) -> Result<Session, GatewayError>;
}

#[async_trait]
pub trait ChatTaskRepository: Send + Sync {
    /// Upsert keyed by `id`; `createdTime` is preserved across updates
    /// (spec §3 invariant, §8 round-trip property).
    async fn upsert(&self, task: ChatTask) -> Result<ChatTask, GatewayError>;
    async fn find_by_session(&self, session_id: &str) -> Result<Vec<ChatTask>, GatewayError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<ChatTask>, GatewayError>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn save_task(&self, task: Task) -> Result<Task, GatewayError>;
    async fn save_event(&self, event: TaskEvent) -> Result<TaskEvent, GatewayError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Task>, GatewayError>;
    async fn find_by_id_with_events(
        &self,
        id: &str,
    ) -> Result<Option<(Task, Vec<TaskEvent>)>, GatewayError>;
    async fn find_events_since(
        &self,
        task_id: &str,
        since_timestamp: Option<EpochMillis>,
        limit: u32,
    ) -> Result<(Vec<TaskEvent>, bool), GatewayError>;
    async fn search(&self, user_id: &str, query: &str) -> Result<Vec<Task>, GatewayError>;
    async fn find_background_tasks_by_status(
        &self,
        status: TaskStatus,
    ) -> Result<Vec<Task>, GatewayError>;
    async fn find_active_background_tasks_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Task>, GatewayError>;
    async fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        end_time: Option<EpochMillis>,
    ) -> Result<(), GatewayError>;
    async fn touch_activity(&self, id: &str, at: EpochMillis) -> Result<(), GatewayError>;
    /// Explicit batched deletion, looping until no rows older than
    /// `cutoff_ms` remain (spec §4.6, §4.11).
    async fn delete_tasks_older_than(
        &self,
        cutoff_ms: EpochMillis,
        batch_size: u32,
    ) -> Result<u64, GatewayError>;
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create(&self, project: Project) -> Result<Project, GatewayError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Project>, GatewayError>;
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Project>, GatewayError>;
    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Project>, GatewayError>;
    async fn soft_delete(&self, id: &str) -> Result<bool, GatewayError>;
}

#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    /// Returns `Ok(None)` when an identical `(user, task, rating)` row
    /// already exists (spec §3 lifecycle: "Created once per").
    async fn create(&self, feedback: Feedback) -> Result<Option<Feedback>, GatewayError>;
    async fn delete_older_than(
        &self,
        cutoff_ms: EpochMillis,
        batch_size: u32,
    ) -> Result<u64, GatewayError>;
}

#[async_trait]
pub trait SseEventBufferRepository: Send + Sync {
    async fn buffer_event(
        &self,
        task_id: &str,
        session_id: &str,
        user_id: &str,
        event_type: &str,
        event_data: serde_json::Value,
    ) -> Result<SseEventBufferEntry, GatewayError>;
    async fn get_buffered_events(
        &self,
        task_id: &str,
        mark_consumed: bool,
    ) -> Result<Vec<SseEventBufferEntry>, GatewayError>;
    async fn has_unconsumed_events(&self, task_id: &str) -> Result<bool, GatewayError>;
    async fn get_unconsumed_events_for_session(
        &self,
        session_id: &str,
    ) -> Result<std::collections::HashMap<String, Vec<SseEventBufferEntry>>, GatewayError>;
    async fn delete_events_for_task(&self, task_id: &str) -> Result<u64, GatewayError>;
    /// Not restricted to consumed events: unconsumed backlogs are aged out
    /// too (spec §4.11).
    async fn cleanup_older_than(
        &self,
        cutoff_ms: EpochMillis,
        batch_size: u32,
    ) -> Result<u64, GatewayError>;
}

#[async_trait]
pub trait DocConversionCacheRepository: Send + Sync {
    /// The losing side of a concurrent insert for the same key returns
    /// `Ok(false)` with no error propagated (spec §8).
    async fn put_if_absent(
        &self,
        entry: DocConversionCacheEntry,
    ) -> Result<bool, GatewayError>;
    async fn get(
        &self,
        content_hash: &str,
        file_extension: &str,
    ) -> Result<Option<DocConversionCacheEntry>, GatewayError>;
    async fn touch_access(&self, content_hash: &str, file_extension: &str) -> Result<(), GatewayError>;
    async fn evict_lru(&self, keep_newest: usize) -> Result<u64, GatewayError>;
}

#[async_trait]
pub trait ScheduledTaskRepository: Send + Sync {
    async fn create(&self, task: ScheduledTask) -> Result<ScheduledTask, GatewayError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<ScheduledTask>, GatewayError>;
    async fn find_enabled_in_namespace(
        &self,
        namespace: &str,
    ) -> Result<Vec<ScheduledTask>, GatewayError>;
    async fn find_by_name_in_namespace(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ScheduledTask>, GatewayError>;
    async fn update(&self, task: ScheduledTask) -> Result<ScheduledTask, GatewayError>;
    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), GatewayError>;
    async fn record_fired(&self, id: &str, at: EpochMillis) -> Result<(), GatewayError>;
    async fn soft_delete(&self, id: &str) -> Result<bool, GatewayError>;

    async fn create_execution(
        &self,
        execution: ScheduledTaskExecution,
    ) -> Result<ScheduledTaskExecution, GatewayError>;
    async fn update_execution(
        &self,
        execution: ScheduledTaskExecution,
    ) -> Result<ScheduledTaskExecution, GatewayError>;
    async fn find_execution_by_a2a_task_id(
        &self,
        a2a_task_id: &str,
    ) -> Result<Option<ScheduledTaskExecution>, GatewayError>;
    async fn find_running_executions(&self) -> Result<Vec<ScheduledTaskExecution>, GatewayError>;
    async fn find_executions_for_task(
        &self,
        scheduled_task_id: &str,
    ) -> Result<Vec<ScheduledTaskExecution>, GatewayError>;

    /// Atomic select-for-update-skip-locked semantics against the single
    /// lock row (spec §4.7).
    async fn try_acquire_lock(
        &self,
        candidate_leader_id: &str,
        candidate_namespace: &str,
        lease_duration_ms: i64,
    ) -> Result<bool, GatewayError>;
    async fn heartbeat_lock(
        &self,
        leader_id: &str,
        lease_duration_ms: i64,
    ) -> Result<bool, GatewayError>;
    async fn read_lock(&self) -> Result<Option<SchedulerLock>, GatewayError>;
}

#[async_trait]
pub trait UsageRepository: Send + Sync {
    async fn upsert_monthly_usage(
        &self,
        user_id: &str,
        month: &str,
        transaction: &TokenTransaction,
    ) -> Result<MonthlyUsage, GatewayError>;
    async fn record_transaction(
        &self,
        transaction: TokenTransaction,
    ) -> Result<TokenTransaction, GatewayError>;
    async fn find_monthly_usage(
        &self,
        user_id: &str,
        month: &str,
    ) -> Result<Option<MonthlyUsage>, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_rejects_zero_page_number() {
        assert!(Pagination::normalize(0, 20).is_err());
    }

    #[test]
    fn pagination_clamps_page_size() {
        let p = Pagination::normalize(1, 500).unwrap();
        assert_eq!(p.page_size, 100);
    }
}
