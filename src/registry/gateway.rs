//! Peer gateway discovery (spec §4.4), grounded on the same upsert/TTL
//! shape as `AgentRegistry` but with a post-unlock `onRemoved` callback
//! instead of a retry ladder.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::RegistryConfig;
use crate::model::{EpochMillis, GatewayCard};

/// Tracks discovered sibling gateways and fires a caller-supplied callback
/// when one is removed, always *after* releasing the internal lock (spec
/// §4.4, §5 "external callbacks are invoked after releasing the mutex to
/// avoid deadlock").
pub struct GatewayRegistry {
    gateways: Mutex<HashMap<String, GatewayCard>>,
    config: RegistryConfig,
}

impl GatewayRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            gateways: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Upserts `card`, stamping `lastSeen` to now, and returns whether this
    /// gateway was previously unknown.
    pub fn add_or_update_gateway(&self, mut card: GatewayCard) -> bool {
        card.last_seen = Some(EpochMillis::now());
        let mut gateways = self.gateways.lock().unwrap();
        let is_new = !gateways.contains_key(&card.name);
        gateways.insert(card.name.clone(), card);
        is_new
    }

    pub fn get_gateway(&self, name: &str) -> Option<GatewayCard> {
        self.gateways.lock().unwrap().get(name).cloned()
    }

    pub fn all_gateways(&self) -> Vec<GatewayCard> {
        self.gateways.lock().unwrap().values().cloned().collect()
    }

    /// `(isExpired, secondsSinceLastSeen)` for one gateway against
    /// `ttl_seconds`, or `(true, 0)` if the gateway is unknown (it is, by
    /// definition, not healthy).
    pub fn health(&self, name: &str, ttl_seconds: Option<i64>) -> (bool, i64) {
        let ttl = ttl_seconds.unwrap_or(self.config.gateway_ttl_seconds);
        match self.get_gateway(name) {
            Some(card) => card.health(EpochMillis::now(), ttl),
            None => (true, 0),
        }
    }

    pub fn fleet_health(&self, ttl_seconds: Option<i64>) -> Vec<(String, bool, i64)> {
        let ttl = ttl_seconds.unwrap_or(self.config.gateway_ttl_seconds);
        let now = EpochMillis::now();
        self.gateways
            .lock()
            .unwrap()
            .values()
            .map(|c| {
                let (expired, secs) = c.health(now, ttl);
                (c.name.clone(), expired, secs)
            })
            .collect()
    }

    /// Removes `name` and invokes `on_removed` after the lock is released
    /// (spec §4.4, §9 "model as message-passing"). Returns whether a
    /// gateway was actually present.
    pub fn remove_gateway(&self, name: &str, on_removed: impl FnOnce(&GatewayCard)) -> bool {
        let removed = {
            let mut gateways = self.gateways.lock().unwrap();
            gateways.remove(name)
        };
        match removed {
            Some(card) => {
                on_removed(&card);
                true
            }
            None => false,
        }
    }

    /// Sweeps every gateway whose TTL has expired, removing each and
    /// invoking `on_removed` per entry outside the lock.
    pub fn evict_expired(&self, mut on_removed: impl FnMut(&GatewayCard)) -> Vec<String> {
        let ttl = self.config.gateway_ttl_seconds;
        let now = EpochMillis::now();
        let expired_names: Vec<String> = {
            let gateways = self.gateways.lock().unwrap();
            gateways
                .values()
                .filter(|c| c.health(now, ttl).0)
                .map(|c| c.name.clone())
                .collect()
        };
        for name in &expired_names {
            let removed = self.gateways.lock().unwrap().remove(name);
            if let Some(card) = removed {
                on_removed(&card);
            }
        }
        expired_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(name: &str) -> GatewayCard {
        GatewayCard {
            name: name.to_string(),
            capabilities: vec![],
            last_seen: None,
        }
    }

    #[test]
    fn upsert_stamps_last_seen() {
        let registry = GatewayRegistry::new(RegistryConfig::default());
        assert!(registry.add_or_update_gateway(card("gw1")));
        assert!(registry.get_gateway("gw1").unwrap().last_seen.is_some());
        assert!(!registry.add_or_update_gateway(card("gw1")));
    }

    #[test]
    fn unknown_gateway_health_reports_expired() {
        let registry = GatewayRegistry::new(RegistryConfig::default());
        assert_eq!(registry.health("ghost", None), (true, 0));
    }

    #[test]
    fn remove_fires_callback_with_removed_card() {
        let registry = GatewayRegistry::new(RegistryConfig::default());
        registry.add_or_update_gateway(card("gw1"));
        let mut seen = None;
        let removed = registry.remove_gateway("gw1", |c| seen = Some(c.name.clone()));
        assert!(removed);
        assert_eq!(seen, Some("gw1".to_string()));
        assert!(registry.get_gateway("gw1").is_none());
    }

    #[test]
    fn evict_expired_only_removes_stale_entries() {
        let registry = GatewayRegistry::new(RegistryConfig {
            gateway_ttl_seconds: 90,
            agent_max_retries: 30,
        });
        let mut stale = card("stale");
        stale.last_seen = Some(EpochMillis(0));
        registry.gateways.lock().unwrap().insert("stale".to_string(), stale);
        registry.add_or_update_gateway(card("fresh"));
        let mut removed_names = Vec::new();
        let expired = registry.evict_expired(|c| removed_names.push(c.name.clone()));
        assert_eq!(expired, vec!["stale".to_string()]);
        assert_eq!(removed_names, vec!["stale".to_string()]);
        assert!(registry.get_gateway("fresh").is_some());
    }
}
