use serde::{Deserialize, Serialize};

use super::ids::EpochMillis;

/// The three known extension URIs a heartbeat card can carry (spec §6.3),
/// modeled as a tagged variant instead of the original's duck-typed
/// string-prefix checks (spec §9 design note).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "uri", content = "data")]
pub enum CardExtension {
    #[serde(rename = "https://solace.com/a2a/extensions/sam/tools")]
    Tools { tools: Vec<ToolCapability> },
    #[serde(rename = "https://solace.com/a2a/extensions/sam/gateway-role")]
    GatewayRole {
        gateway_type: String,
        namespace: String,
    },
    #[serde(rename = "https://solace.com/a2a/extensions/sam/deployment")]
    Deployment { deployment_id: String },
    #[serde(untagged)]
    Unknown(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCapability {
    pub name: String,
    pub required_scopes: Vec<String>,
}

/// A discovered agent, upserted on heartbeat (spec §3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    pub capabilities: Vec<CardExtension>,
    pub metadata: serde_json::Value,
}

impl AgentCard {
    pub fn tools(&self) -> Vec<&ToolCapability> {
        self.capabilities
            .iter()
            .filter_map(|c| match c {
                CardExtension::Tools { tools } => Some(tools.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

/// A discovered peer gateway, upserted on heartbeat (spec §3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCard {
    pub name: String,
    pub capabilities: Vec<CardExtension>,
    pub last_seen: Option<EpochMillis>,
}

impl GatewayCard {
    pub fn gateway_type(&self) -> Option<&str> {
        self.capabilities.iter().find_map(|c| match c {
            CardExtension::GatewayRole { gateway_type, .. } => Some(gateway_type.as_str()),
            _ => None,
        })
    }

    pub fn namespace(&self) -> Option<&str> {
        self.capabilities.iter().find_map(|c| match c {
            CardExtension::GatewayRole { namespace, .. } => Some(namespace.as_str()),
            _ => None,
        })
    }

    pub fn deployment_id(&self) -> Option<&str> {
        self.capabilities.iter().find_map(|c| match c {
            CardExtension::Deployment { deployment_id } => Some(deployment_id.as_str()),
            _ => None,
        })
    }

    /// `(isExpired, secondsSinceLastSeen)` against `ttl_seconds` (spec §4.4).
    /// A card with no `lastSeen` returns `(false, 0)` (spec §8 boundary
    /// behavior).
    pub fn health(&self, now: EpochMillis, ttl_seconds: i64) -> (bool, i64) {
        match self.last_seen {
            None => (false, 0),
            Some(last) => {
                let elapsed_s = (now.0 - last.0) / 1000;
                (elapsed_s > ttl_seconds, elapsed_s)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_last_seen_is_not_expired() {
        let card = GatewayCard {
            name: "gw1".into(),
            capabilities: vec![],
            last_seen: None,
        };
        assert_eq!(card.health(EpochMillis(1000), 90), (false, 0));
    }

    #[test]
    fn ttl_expiry_uses_seconds() {
        let card = GatewayCard {
            name: "gw1".into(),
            capabilities: vec![],
            last_seen: Some(EpochMillis(0)),
        };
        let (expired, secs) = card.health(EpochMillis(100_000), 90);
        assert!(expired);
        assert_eq!(secs, 100);
    }
}
