//! Persisted and wire data model (spec §3).
//!
//! Every entity here is a plain `serde`-derived struct. `messageBubbles` and
//! `taskMetadata` stay opaque `String`s at this boundary per spec §9's
//! "dynamically typed payloads" design note — the core never parses their
//! schema, only stores and returns them.

mod card;
mod chat_task;
mod doc_cache;
mod feedback;
mod ids;
mod project;
mod scheduled_task;
mod session;
mod sse_buffer;
mod task;
mod usage;

pub use card::{AgentCard, CardExtension, GatewayCard};
pub use chat_task::ChatTask;
pub use doc_cache::DocConversionCacheEntry;
pub use feedback::{Feedback, FeedbackRating};
pub use ids::EpochMillis;
pub use project::Project;
pub use scheduled_task::{
    ExecutionArtifact, ExecutionStatus, NotificationConfig, ScheduleType, ScheduledTask,
    ScheduledTaskExecution, SchedulerLock, TaskMessagePart,
};
pub use session::Session;
pub use sse_buffer::SseEventBufferEntry;
pub use task::{EventDirection, Task, TaskEvent, TaskStatus};
pub use usage::{MonthlyUsage, TokenTransaction, TransactionType};
