//! Live peer discovery from heartbeat cards (spec §4.4): agents and sibling
//! gateways, each behind one mutex per registry with post-unlock callback
//! dispatch for removal notifications (spec §5, §9).

pub mod agent;
pub mod gateway;

pub use agent::AgentRegistry;
pub use gateway::GatewayRegistry;
