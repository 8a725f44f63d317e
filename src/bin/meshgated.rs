//! The gateway binary: wires a backend (in-memory or Postgres), every
//! service in `meshgate::context`, and serves the REST/SSE surface over
//! HTTP. Configuration is read straight out of environment variables —
//! following `GatewayConfig`'s own doc comment, the same way the teacher's
//! examples read `OPEN_AI_SECRET` directly rather than through a config
//! file layer.

use std::net::SocketAddr;
use std::sync::Arc;

use meshgate::assistant::openai_client::OpenAiChatLlm;
use meshgate::assistant::{ChatLlm, NoopChatLlm};
use meshgate::bus::{Bus, InMemoryBus};
use meshgate::config::{GatewayConfig, SchedulerConfig, SchedulerMode};
use meshgate::config_resolver::{ConfigResolver, PermissiveConfigResolver};
use meshgate::context::{self, Repositories};
use meshgate::docconvert::{OfficeConverter, SubprocessOfficeConverter};
use meshgate::repository::memory::{
    InMemoryChatTaskRepository, InMemoryDocConversionCacheRepository, InMemoryFeedbackRepository,
    InMemoryProjectRepository, InMemoryScheduledTaskRepository, InMemorySessionRepository,
    InMemorySseEventBufferRepository, InMemoryTaskRepository, InMemoryUsageRepository,
};
use meshgate::repository::sqlx_backend::PgBackend;
use meshgate::scheduler::leader_election::LeaderElection;
use meshgate::scheduler::SchedulerLeadershipBridge;
use meshgate::session::compression::Summarizer;
use meshgate::speech::SpeechProvider;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = build_config();
    let bus: Arc<dyn Bus> = Arc::new(InMemoryBus::new());
    let config_resolver: Arc<dyn ConfigResolver> = Arc::new(PermissiveConfigResolver);

    let repos = build_repositories(&config).await;

    let chat_llm: Arc<dyn ChatLlm> = match OpenAiChatLlm::from_env() {
        Some(client) => Arc::new(client),
        None => {
            log::warn!("OPEN_AI_SECRET not set; builder assistants will degrade to their fixed fallback reply");
            Arc::new(NoopChatLlm)
        }
    };
    let summarizer: Option<Arc<dyn Summarizer>> = OpenAiChatLlm::from_env().map(|c| Arc::new(c) as Arc<dyn Summarizer>);

    let office_binary = std::env::var("SOFFICE_PATH").unwrap_or_else(|_| "soffice".to_string());
    let document_converter: Arc<dyn OfficeConverter> = Arc::new(SubprocessOfficeConverter::new(office_binary));

    let speech_providers: Vec<Arc<dyn SpeechProvider>> = Vec::new();

    let gateway_instance_id = config.scheduler.instance_id.clone();
    let scheduler_cfg = config.scheduler.clone();
    let namespace = scheduler_cfg.namespace.clone();
    let scheduled_task_repo = repos.scheduled_tasks.clone();

    let ctx = context::build_context(
        config,
        bus,
        config_resolver,
        repos,
        summarizer,
        chat_llm,
        document_converter,
        speech_providers,
        gateway_instance_id.clone(),
    );

    ctx.background_task_monitor
        .clone()
        .recover_orphans_once()
        .await
        .unwrap_or_else(|e| {
            log::error!("orphan recovery failed: {e}");
            0
        });
    tokio::spawn(ctx.background_task_monitor.clone().run_forever());
    tokio::spawn(ctx.retention.clone().run_forever());

    if scheduler_cfg.mode == SchedulerMode::Embedded {
        let scheduler = ctx.scheduler.clone();
        tokio::spawn(scheduler.clone().run_response_listener());
        tokio::spawn(scheduler.clone().run_result_reaper(300));

        let election = Arc::new(LeaderElection::new(
            scheduled_task_repo.clone(),
            gateway_instance_id,
            namespace.clone(),
            scheduler_cfg.leader_election.clone(),
        ));
        let bridge = Arc::new(SchedulerLeadershipBridge::new(scheduler, scheduled_task_repo, namespace));
        tokio::spawn(election.run(bridge));
    }

    let app = meshgate::rest::router()
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(ctx);

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .expect("BIND_ADDR must be a valid socket address");

    log::info!("meshgated listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind listener");
    axum::serve(listener, app).await.expect("server error");
}

fn build_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.persistence_enabled = std::env::var("DATABASE_URL").is_ok();
    config.auth_enabled = std::env::var("AUTH_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);
    if let Ok(dev_user_id) = std::env::var("DEV_USER_ID") {
        config.dev_user_id = dev_user_id;
    }
    config.scheduler = SchedulerConfig {
        mode: if std::env::var("SCHEDULER_ORCHESTRATOR_DELEGATED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false)
        {
            SchedulerMode::OrchestratorDelegated
        } else {
            SchedulerMode::Embedded
        },
        namespace: std::env::var("GATEWAY_NAMESPACE").unwrap_or_else(|_| "default".to_string()),
        ..SchedulerConfig::default()
    };
    config
}

async fn build_repositories(config: &GatewayConfig) -> Repositories {
    if !config.persistence_enabled {
        log::info!("persistence disabled; using in-memory repositories");
        return Repositories {
            sessions: Arc::new(InMemorySessionRepository::new()),
            chat_tasks: Arc::new(InMemoryChatTaskRepository::new()),
            projects: Arc::new(InMemoryProjectRepository::new()),
            tasks: Arc::new(InMemoryTaskRepository::new()),
            feedback: Arc::new(InMemoryFeedbackRepository::new()),
            sse_events: Arc::new(InMemorySseEventBufferRepository::new()),
            doc_conversion_cache: Arc::new(InMemoryDocConversionCacheRepository::new()),
            scheduled_tasks: Arc::new(InMemoryScheduledTaskRepository::new()),
            usage: Arc::new(InMemoryUsageRepository::new()),
        };
    }

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set when persistence is enabled");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("failed to connect to database");
    let backend = Arc::new(PgBackend::new(pool));
    if std::env::var("SKIP_MIGRATIONS").is_err() {
        backend.migrate().await.expect("failed to run schema migration");
    }

    Repositories {
        sessions: backend.clone(),
        chat_tasks: backend.clone(),
        projects: backend.clone(),
        tasks: backend.clone(),
        feedback: backend.clone(),
        sse_events: backend.clone(),
        doc_conversion_cache: backend.clone(),
        scheduled_tasks: backend.clone(),
        usage: backend,
    }
}
