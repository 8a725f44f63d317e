//! Live agent discovery (spec §4.4), grounded on the retry-count escalation
//! ladder the Python `AgentRegistry` logs at.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::RegistryConfig;
use crate::model::{AgentCard, EpochMillis};

struct AgentEntry {
    card: AgentCard,
    last_seen: EpochMillis,
    retry_count: u32,
}

/// Tracks discovered agents and their heartbeat recency. Retry counts are
/// maintained here but eviction is left to the caller (spec §9 open
/// question — the registry itself never evicts on retry count alone).
pub struct AgentRegistry {
    agents: Mutex<HashMap<String, AgentEntry>>,
    config: RegistryConfig,
}

impl AgentRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            agents: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Upserts `card`, resetting its retry count, and returns whether this
    /// is a newly seen agent.
    pub fn add_or_update_agent(&self, card: AgentCard) -> bool {
        if card.name.is_empty() {
            log::warn!("attempted to register agent with missing name");
            return false;
        }
        let mut agents = self.agents.lock().unwrap();
        let is_new = !agents.contains_key(&card.name);
        let previous_retry_count = agents.get(&card.name).map_or(0, |e| e.retry_count);
        agents.insert(
            card.name.clone(),
            AgentEntry {
                card,
                last_seen: EpochMillis::now(),
                retry_count: 0,
            },
        );
        if is_new {
            log::info!("new agent registered");
        } else if previous_retry_count > 0 {
            log::info!(
                "agent reconnected, retry count reset from {previous_retry_count} to 0"
            );
        }
        is_new
    }

    pub fn get_agent(&self, agent_name: &str) -> Option<AgentCard> {
        self.agents.lock().unwrap().get(agent_name).map(|e| e.card.clone())
    }

    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn last_seen(&self, agent_name: &str) -> Option<EpochMillis> {
        self.agents.lock().unwrap().get(agent_name).map(|e| e.last_seen)
    }

    /// Increments and returns the retry count, logging at escalating
    /// severity past 10 and 20 attempts out of the configured max (spec
    /// §4.4).
    pub fn increment_retry_count(&self, agent_name: &str) -> u32 {
        let mut agents = self.agents.lock().unwrap();
        let Some(entry) = agents.get_mut(agent_name) else {
            log::debug!("attempted to increment retry count for unknown agent {agent_name}");
            return 0;
        };
        entry.retry_count += 1;
        let count = entry.retry_count;
        let max = self.config.agent_max_retries;
        if count >= 20 {
            log::warn!("agent '{agent_name}' retry count critical: {count}/{max}");
        } else if count >= 10 {
            log::warn!("agent '{agent_name}' retry count elevated: {count}/{max}");
        } else {
            log::info!("agent '{agent_name}' retry count: {count}/{max}");
        }
        count
    }

    pub fn remove_agent(&self, agent_name: &str) -> bool {
        let removed = self.agents.lock().unwrap().remove(agent_name).is_some();
        if removed {
            log::warn!("removing agent '{agent_name}' from registry");
        }
        removed
    }

    pub fn clear(&self) {
        self.agents.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(name: &str) -> AgentCard {
        AgentCard {
            name: name.to_string(),
            capabilities: vec![],
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn registering_the_same_agent_twice_is_not_new() {
        let registry = AgentRegistry::new(RegistryConfig::default());
        assert!(registry.add_or_update_agent(card("echo")));
        assert!(!registry.add_or_update_agent(card("echo")));
    }

    #[test]
    fn retry_count_resets_on_update() {
        let registry = AgentRegistry::new(RegistryConfig::default());
        registry.add_or_update_agent(card("echo"));
        registry.increment_retry_count("echo");
        registry.increment_retry_count("echo");
        registry.add_or_update_agent(card("echo"));
        assert_eq!(registry.increment_retry_count("echo"), 1);
    }

    #[test]
    fn agent_names_are_sorted() {
        let registry = AgentRegistry::new(RegistryConfig::default());
        registry.add_or_update_agent(card("zeta"));
        registry.add_or_update_agent(card("alpha"));
        assert_eq!(registry.agent_names(), vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
