//! Single-row DB-lock leader election (spec §4.7), grounded on
//! `original_source`'s `leader_election.py`: an election loop alternates
//! between trying to acquire the lock and, once held, heartbeating it
//! until a heartbeat is lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::LeaderElectionConfig;
use crate::repository::ScheduledTaskRepository;

/// Notified on leadership transitions so the scheduler can (un)schedule
/// its local jobs (spec §4.7: "On leader promotion... schedules them; on
/// demotion, it unschedules all").
#[async_trait]
pub trait LeadershipObserver: Send + Sync {
    async fn on_promoted(&self);
    async fn on_demoted(&self);
}

pub struct LeaderElection {
    repo: Arc<dyn ScheduledTaskRepository>,
    instance_id: String,
    namespace: String,
    config: LeaderElectionConfig,
    is_leader: AtomicBool,
    stop: Mutex<bool>,
}

impl LeaderElection {
    pub fn new(
        repo: Arc<dyn ScheduledTaskRepository>,
        instance_id: String,
        namespace: String,
        config: LeaderElectionConfig,
    ) -> Self {
        Self {
            repo,
            instance_id,
            namespace,
            config,
            is_leader: AtomicBool::new(false),
            stop: Mutex::new(false),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// Runs the election loop until `stop()` is called. Each cycle either
    /// tries to acquire leadership (follower path) or heartbeats an
    /// existing lease (leader path); either failure demotes and backs off.
    pub async fn run(self: Arc<Self>, observer: Arc<dyn LeadershipObserver>) {
        let lease_duration_ms = self.config.lease_duration_seconds * 1000;
        loop {
            if *self.stop.lock().await {
                break;
            }

            let acquired = if self.is_leader() {
                self.repo
                    .heartbeat_lock(&self.instance_id, lease_duration_ms)
                    .await
                    .unwrap_or(false)
            } else {
                self.repo
                    .try_acquire_lock(&self.instance_id, &self.namespace, lease_duration_ms)
                    .await
                    .unwrap_or(false)
            };

            if acquired {
                if !self.is_leader.swap(true, Ordering::SeqCst) {
                    log::info!("[{}] acquired scheduler leadership", self.instance_id);
                    observer.on_promoted().await;
                }
            } else if self.is_leader.swap(false, Ordering::SeqCst) {
                log::warn!("[{}] lost scheduler leadership", self.instance_id);
                observer.on_demoted().await;
            }

            tokio::time::sleep(std::time::Duration::from_secs(self.config.heartbeat_interval_seconds)).await;
        }
    }

    pub async fn stop(&self) {
        *self.stop.lock().await = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::InMemoryScheduledTaskRepository;
    use std::sync::atomic::AtomicU32;

    struct CountingObserver {
        promotions: AtomicU32,
        demotions: AtomicU32,
    }

    #[async_trait]
    impl LeadershipObserver for CountingObserver {
        async fn on_promoted(&self) {
            self.promotions.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_demoted(&self) {
            self.demotions.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn sole_instance_acquires_and_stays_leader() {
        let repo = Arc::new(InMemoryScheduledTaskRepository::new());
        let election = Arc::new(LeaderElection::new(
            repo,
            "gw-1".to_string(),
            "ns".to_string(),
            LeaderElectionConfig {
                heartbeat_interval_seconds: 3600,
                lease_duration_seconds: 60,
            },
        ));
        let observer = Arc::new(CountingObserver {
            promotions: AtomicU32::new(0),
            demotions: AtomicU32::new(0),
        });
        let election_clone = election.clone();
        let handle = tokio::spawn(election_clone.run(observer.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(election.is_leader());
        election.stop().await;
        let _ = tokio::time::timeout(std::time::Duration::from_secs(2), handle).await;
        assert_eq!(observer.promotions.load(Ordering::SeqCst), 1);
    }
}
