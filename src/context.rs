//! Bundles every repository, registry, and service `Arc` constructed once
//! at startup and threaded into every handler — the gateway holds no
//! process statics (spec §9 "no process statics").

use std::sync::Arc;

use crate::assistant::{BuilderAssistant, ChatLlm};
use crate::background_task_monitor::BackgroundTaskMonitor;
use crate::bus::Bus;
use crate::config::GatewayConfig;
use crate::config_resolver::ConfigResolver;
use crate::dispatcher::TaskDispatcher;
use crate::docconvert::DocumentConversionService;
use crate::feedback::FeedbackService;
use crate::registry::{AgentRegistry, GatewayRegistry};
use crate::repository::{
    ChatTaskRepository, DocConversionCacheRepository, FeedbackRepository, ProjectRepository,
    ScheduledTaskRepository, SessionRepository, SseEventBufferRepository, TaskRepository, UsageRepository,
};
use crate::retention::DataRetentionService;
use crate::scheduler::Scheduler;
use crate::session::compression::{CompressionService, Summarizer};
use crate::session::service::SessionService;
use crate::speech::{SpeechProvider, SpeechService};
use crate::sse::{PersistentEventBuffer, SseManager};
use crate::usage::UsageTrackingService;

/// Every cross-cutting collaborator a REST handler or background task
/// might need, constructed once in `meshgated` and cloned cheaply
/// (everything here is already `Arc`-wrapped).
#[derive(Clone)]
pub struct GatewayContext {
    pub config: Arc<GatewayConfig>,
    pub bus: Arc<dyn Bus>,
    pub config_resolver: Arc<dyn ConfigResolver>,

    pub sse_manager: Arc<SseManager>,
    pub persistent_buffer: Arc<PersistentEventBuffer>,
    pub dispatcher: Arc<TaskDispatcher>,

    pub agent_registry: Arc<AgentRegistry>,
    pub gateway_registry: Arc<GatewayRegistry>,

    pub sessions: Arc<SessionService>,
    pub compression: Arc<CompressionService>,
    pub feedback: Arc<FeedbackService>,
    pub usage: Arc<UsageTrackingService>,
    pub document_conversion: Arc<DocumentConversionService>,
    pub speech: Arc<SpeechService>,

    pub prompt_builder: Arc<BuilderAssistant>,
    pub task_builder: Arc<BuilderAssistant>,

    pub background_task_monitor: Arc<BackgroundTaskMonitor>,
    pub retention: Arc<DataRetentionService>,
    pub scheduler: Arc<Scheduler>,

    pub task_repo: Arc<dyn TaskRepository>,
    pub scheduled_task_repo: Arc<dyn ScheduledTaskRepository>,
}

/// Every backend-specific repository `Arc`, grouped so `GatewayContext`
/// construction reads as "wire the backend, then wire everything that
/// depends on it" regardless of whether the backend is the in-memory
/// fakes or `PgBackend` (spec §9 "Optional persistence mode").
pub struct Repositories {
    pub sessions: Arc<dyn SessionRepository>,
    pub chat_tasks: Arc<dyn ChatTaskRepository>,
    pub projects: Arc<dyn ProjectRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub feedback: Arc<dyn FeedbackRepository>,
    pub sse_events: Arc<dyn SseEventBufferRepository>,
    pub doc_conversion_cache: Arc<dyn DocConversionCacheRepository>,
    pub scheduled_tasks: Arc<dyn ScheduledTaskRepository>,
    pub usage: Arc<dyn UsageRepository>,
}

#[allow(clippy::too_many_arguments)]
pub fn build_context(
    config: GatewayConfig,
    bus: Arc<dyn Bus>,
    config_resolver: Arc<dyn ConfigResolver>,
    repos: Repositories,
    summarizer: Option<Arc<dyn Summarizer>>,
    chat_llm: Arc<dyn ChatLlm>,
    document_converter: Arc<dyn crate::docconvert::OfficeConverter>,
    speech_providers: Vec<Arc<dyn SpeechProvider>>,
    gateway_instance_id: String,
) -> GatewayContext {
    let config = Arc::new(config);
    let namespace = config.scheduler.namespace.clone();

    let sse_manager = Arc::new(SseManager::new(config.sse.clone()));
    let persistent_buffer = Arc::new(PersistentEventBuffer::new(repos.sse_events.clone()));
    let dispatcher = Arc::new(TaskDispatcher::new(
        bus.clone(),
        sse_manager.clone(),
        persistent_buffer.clone(),
        repos.tasks.clone(),
        namespace.clone(),
        gateway_instance_id,
    ));

    let agent_registry = Arc::new(AgentRegistry::new(config.registry.clone()));
    let gateway_registry = Arc::new(GatewayRegistry::new(config.registry.clone()));

    let sessions = Arc::new(SessionService::new(
        repos.sessions.clone(),
        repos.chat_tasks.clone(),
        repos.projects.clone(),
    ));
    let compression = Arc::new(CompressionService::new(sessions.clone(), summarizer));
    let feedback = Arc::new(FeedbackService::new(repos.feedback.clone()));
    let usage = Arc::new(UsageTrackingService::new(
        repos.usage.clone(),
        crate::usage::PricingTable::default(),
    ));
    let document_conversion = Arc::new(DocumentConversionService::new(
        repos.doc_conversion_cache.clone(),
        document_converter,
    ));
    let speech = Arc::new(SpeechService::new(speech_providers));

    let prompt_builder = Arc::new(BuilderAssistant::new(
        crate::assistant::AssistantKind::PromptBuilder,
        chat_llm.clone(),
    ));
    let task_builder = Arc::new(BuilderAssistant::new(crate::assistant::AssistantKind::TaskBuilder, chat_llm));

    let background_task_monitor = Arc::new(BackgroundTaskMonitor::new(
        repos.tasks.clone(),
        dispatcher.clone(),
        config.background_monitor.clone(),
    ));
    let retention = Arc::new(DataRetentionService::new(
        repos.tasks.clone(),
        repos.feedback.clone(),
        repos.sse_events.clone(),
        config.retention.clone(),
    ));

    let result_collector = Arc::new(crate::scheduler::result_collector::StatelessResultCollector::new(
        repos.scheduled_tasks.clone(),
    ));
    let scheduler = Arc::new(Scheduler::new(
        repos.scheduled_tasks.clone(),
        bus.clone(),
        result_collector,
        config.scheduler.clone(),
    ));

    GatewayContext {
        config,
        bus,
        config_resolver,
        sse_manager,
        persistent_buffer,
        dispatcher,
        agent_registry,
        gateway_registry,
        sessions,
        compression,
        feedback,
        usage,
        document_conversion,
        speech,
        prompt_builder,
        task_builder,
        background_task_monitor,
        retention,
        scheduler,
        task_repo: repos.tasks,
        scheduled_task_repo: repos.scheduled_tasks,
    }
}
