//! Gateway configuration.
//!
//! Following the teacher's `CloudLLMConfig` ("users construct this
//! manually — no file parsing dependencies are required"), every field here
//! is set by plain struct literal or a `Default` impl. The `meshgated`
//! binary reads overrides straight out of `std::env::var`, the same way the
//! teacher's examples read `OPEN_AI_SECRET` directly.

use std::time::Duration;

/// SSE streaming & buffering knobs (spec §4.2).
#[derive(Debug, Clone)]
pub struct SseConfig {
    /// Bound on each per-consumer queue (spec §4.2).
    pub max_queue_size: usize,
    /// Timeout for a single `put` onto a consumer queue before the queue is
    /// considered full and dropped (spec §5, "≈100ms").
    pub put_timeout: Duration,
    /// Idle timeout used only to check client disconnects, never to drop
    /// the stream on its own (spec §5).
    pub idle_check_interval: Duration,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 256,
            put_timeout: Duration::from_millis(100),
            idle_check_interval: Duration::from_secs(120),
        }
    }
}

/// Gateway/agent health-check knobs (spec §4.4).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub gateway_ttl_seconds: i64,
    pub agent_max_retries: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            gateway_ttl_seconds: 90,
            agent_max_retries: 30,
        }
    }
}

/// Leader-election timing (spec §4.7).
#[derive(Debug, Clone)]
pub struct LeaderElectionConfig {
    pub heartbeat_interval_seconds: u64,
    pub lease_duration_seconds: i64,
}

impl Default for LeaderElectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: 30,
            lease_duration_seconds: 60,
        }
    }
}

/// Retention sweep configuration, validated with hard floors (spec §4.11).
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub task_retention_days: u32,
    pub feedback_retention_days: u32,
    pub sse_event_retention_days: u32,
    pub cleanup_interval_hours: u32,
    pub batch_size: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            task_retention_days: 90,
            feedback_retention_days: 180,
            sse_event_retention_days: 30,
            cleanup_interval_hours: 24,
            batch_size: 500,
        }
    }
}

impl RetentionConfig {
    /// Clamps every field to its documented floor/ceiling, logging a
    /// warning for each value that had to be adjusted (spec §4.11).
    pub fn clamped(mut self) -> Self {
        if self.task_retention_days < 1 {
            log::warn!("taskRetentionDays below floor of 1, clamping");
            self.task_retention_days = 1;
        }
        if self.feedback_retention_days < 1 {
            log::warn!("feedbackRetentionDays below floor of 1, clamping");
            self.feedback_retention_days = 1;
        }
        if self.sse_event_retention_days < 1 {
            log::warn!("sseEventRetentionDays below floor of 1, clamping");
            self.sse_event_retention_days = 1;
        }
        if self.cleanup_interval_hours < 1 {
            log::warn!("cleanupIntervalHours below floor of 1, clamping");
            self.cleanup_interval_hours = 1;
        }
        if self.batch_size < 1 {
            log::warn!("batchSize below floor of 1, clamping");
            self.batch_size = 1;
        } else if self.batch_size > 10_000 {
            log::warn!("batchSize above ceiling of 10000, clamping");
            self.batch_size = 10_000;
        }
        self
    }
}

/// Background task timeout defaults (spec §4.10).
#[derive(Debug, Clone)]
pub struct BackgroundTaskMonitorConfig {
    pub default_max_execution_time_ms: i64,
    pub sweep_interval: Duration,
}

impl Default for BackgroundTaskMonitorConfig {
    fn default() -> Self {
        Self {
            default_max_execution_time_ms: 30 * 60 * 1000,
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Whether the scheduler reflects `ScheduledTask`s into a container
/// orchestrator, or runs its own in-process trigger engine (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerMode {
    Embedded,
    OrchestratorDelegated,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub mode: SchedulerMode,
    pub instance_id: String,
    pub namespace: String,
    pub leader_election: LeaderElectionConfig,
    pub result_reaper_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: SchedulerMode::Embedded,
            instance_id: uuid::Uuid::new_v4().to_string(),
            namespace: "default".to_string(),
            leader_election: LeaderElectionConfig::default(),
            result_reaper_interval: Duration::from_secs(30),
        }
    }
}

/// Feature flags surfaced verbatim on `GET /config` (spec §6.1).
#[derive(Debug, Clone)]
pub struct FeatureFlags {
    pub feedback_enabled: bool,
    pub prompt_library_enabled: bool,
    pub prompt_ai_assisted_enabled: bool,
    pub prompt_version_history_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            feedback_enabled: true,
            prompt_library_enabled: true,
            prompt_ai_assisted_enabled: true,
            prompt_version_history_enabled: false,
        }
    }
}

/// Top-level gateway configuration, bundling every subsystem's knobs.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub sse: SseConfig,
    pub registry: RegistryConfig,
    pub retention: RetentionConfig,
    pub background_monitor: BackgroundTaskMonitorConfig,
    pub scheduler: SchedulerConfig,
    /// Whether per-request DB persistence is configured at all. When
    /// `false`, every persistence-dependent feature degrades per spec §9's
    /// "Optional persistence mode" design note and `GET /config` reports
    /// the degraded flags.
    pub persistence_enabled: bool,
    /// Whether the identity-mapping middleware is active. When `false`, a
    /// fixed development user is used for every request (spec §6.1
    /// "Authentication").
    pub auth_enabled: bool,
    /// The fixed user id used when `auth_enabled` is `false`.
    pub dev_user_id: String,
    pub features: FeatureFlags,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            sse: SseConfig::default(),
            registry: RegistryConfig::default(),
            retention: RetentionConfig::default(),
            background_monitor: BackgroundTaskMonitorConfig::default(),
            scheduler: SchedulerConfig::default(),
            persistence_enabled: false,
            auth_enabled: false,
            dev_user_id: "dev-user".to_string(),
            features: FeatureFlags::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_config_clamps_out_of_range_values() {
        let cfg = RetentionConfig {
            task_retention_days: 0,
            feedback_retention_days: 0,
            sse_event_retention_days: 0,
            cleanup_interval_hours: 0,
            batch_size: 50_000,
        }
        .clamped();
        assert_eq!(cfg.task_retention_days, 1);
        assert_eq!(cfg.batch_size, 10_000);
    }
}
