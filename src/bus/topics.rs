//! A2A topic taxonomy (spec §6.2). Namespaces carry a trailing slash.

/// `{ns}a2a/v1/agent/{agentName}/request`
pub fn agent_request(namespace: &str, agent_name: &str) -> String {
    format!("{namespace}a2a/v1/agent/{agent_name}/request")
}

/// `{ns}a2a/v1/gateway/{gatewayInstanceId}/response`
pub fn gateway_response(namespace: &str, gateway_instance_id: &str) -> String {
    format!("{namespace}a2a/v1/gateway/{gateway_instance_id}/response")
}

/// `{ns}a2a/v1/scheduler/response/{schedulerInstanceId}`
pub fn scheduler_response(namespace: &str, scheduler_instance_id: &str) -> String {
    format!("{namespace}a2a/v1/scheduler/response/{scheduler_instance_id}")
}

/// `{ns}.../discovery/agentcards/...` — ignored by the task logger.
pub fn discovery_agent_cards(namespace: &str) -> String {
    format!("{namespace}a2a/v1/discovery/agentcards/*")
}

pub fn discovery_gateway_cards(namespace: &str) -> String {
    format!("{namespace}a2a/v1/discovery/gatewaycards/*")
}

/// Whether `topic` falls under the agent/gateway-card discovery taxonomy,
/// used by the task logger to skip logging discovery chatter (spec §6.2).
pub fn is_discovery_topic(topic: &str) -> bool {
    topic.contains("/discovery/agentcards/") || topic.contains("/discovery/gatewaycards/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_topics_are_recognized() {
        assert!(is_discovery_topic("myns/a2a/v1/discovery/agentcards/echo"));
        assert!(!is_discovery_topic("myns/a2a/v1/agent/echo/request"));
    }
}
