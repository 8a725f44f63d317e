//! `HashMap`-backed fakes of every repository trait, used as the default
//! test double and as the backend for `persistence_enabled = false` mode
//! (spec §9 "Optional persistence mode").

mod doc_cache;
mod feedback;
mod project;
mod scheduled_task;
mod session;
mod sse_buffer;
mod task;
mod usage;

pub use doc_cache::InMemoryDocConversionCacheRepository;
pub use feedback::InMemoryFeedbackRepository;
pub use project::InMemoryProjectRepository;
pub use scheduled_task::InMemoryScheduledTaskRepository;
pub use session::{InMemoryChatTaskRepository, InMemorySessionRepository};
pub use sse_buffer::InMemorySseEventBufferRepository;
pub use task::InMemoryTaskRepository;
pub use usage::InMemoryUsageRepository;
