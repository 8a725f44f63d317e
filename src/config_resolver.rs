//! The `ConfigResolver` seam (spec §6.4): user/scope/feature resolution is
//! consumed by the gateway core, not implemented by it. Production
//! deployments plug in whatever governs their org's user configuration;
//! this crate only defines the contract and ships a permissive default
//! used by tests and single-tenant deployments.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GatewayError;

/// What an operation needs authorized before it's allowed to run.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub operation_type: String,
    pub target_agent: String,
    pub target_tool: Option<String>,
    pub required_scopes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub required_scopes: Vec<String>,
}

/// Scopes a card's tool declares it needs (spec §6.3 `sam/tools` extension).
#[derive(Debug, Clone)]
pub struct ToolMetadata {
    pub required_scopes: Vec<String>,
}

#[async_trait]
pub trait ConfigResolver: Send + Sync {
    /// Validates that a caller's resolved config authorizes an operation
    /// against a target agent/tool, returning the scopes that were missing
    /// when invalid (spec §6.4, surfaced as a 403 listing required scopes).
    async fn validate_operation_config(
        &self,
        user_config: &Value,
        operation: &OperationContext,
    ) -> Result<ValidationOutcome, GatewayError>;

    /// Resolves the effective configuration for a user, merging app-level
    /// defaults with anything the org's config store overrides.
    async fn resolve_user_config(&self, user_id: &str, app_config: &Value) -> Result<Value, GatewayError>;

    /// Whether a feature gated behind the given tool's required scopes is
    /// enabled for this user's resolved config (spec §6.1 `GET /agentCards`
    /// "filtered by user scope and per-tool required scopes").
    async fn is_feature_enabled(&self, user_config: &Value, tool: &ToolMetadata) -> bool;
}

/// Grants every scope to every user. Used for single-tenant deployments
/// and as the default in tests; never appropriate where scope enforcement
/// actually matters.
pub struct PermissiveConfigResolver;

#[async_trait]
impl ConfigResolver for PermissiveConfigResolver {
    async fn validate_operation_config(
        &self,
        _user_config: &Value,
        _operation: &OperationContext,
    ) -> Result<ValidationOutcome, GatewayError> {
        Ok(ValidationOutcome {
            valid: true,
            required_scopes: Vec::new(),
        })
    }

    async fn resolve_user_config(&self, _user_id: &str, app_config: &Value) -> Result<Value, GatewayError> {
        Ok(app_config.clone())
    }

    async fn is_feature_enabled(&self, _user_config: &Value, _tool: &ToolMetadata) -> bool {
        true
    }
}

/// A resolver that grants each user a fixed, configured scope set. Useful
/// for tests exercising the 403-with-missing-scopes path without a real
/// config store.
pub struct FixedScopeConfigResolver {
    granted_scopes: HashSet<String>,
}

impl FixedScopeConfigResolver {
    pub fn new(granted_scopes: impl IntoIterator<Item = String>) -> Self {
        Self {
            granted_scopes: granted_scopes.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ConfigResolver for FixedScopeConfigResolver {
    async fn validate_operation_config(
        &self,
        _user_config: &Value,
        operation: &OperationContext,
    ) -> Result<ValidationOutcome, GatewayError> {
        let missing: Vec<String> = operation
            .required_scopes
            .iter()
            .filter(|scope| !self.granted_scopes.contains(*scope))
            .cloned()
            .collect();
        Ok(ValidationOutcome {
            valid: missing.is_empty(),
            required_scopes: missing,
        })
    }

    async fn resolve_user_config(&self, _user_id: &str, app_config: &Value) -> Result<Value, GatewayError> {
        Ok(app_config.clone())
    }

    async fn is_feature_enabled(&self, _user_config: &Value, tool: &ToolMetadata) -> bool {
        tool.required_scopes.iter().all(|s| self.granted_scopes.contains(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_resolver_reports_missing_scopes() {
        let resolver = FixedScopeConfigResolver::new(["chat:read".to_string()]);
        let outcome = resolver
            .validate_operation_config(
                &Value::Null,
                &OperationContext {
                    operation_type: "tool_call".to_string(),
                    target_agent: "assistant".to_string(),
                    target_tool: Some("search".to_string()),
                    required_scopes: vec!["chat:read".to_string(), "chat:admin".to_string()],
                },
            )
            .await
            .unwrap();
        assert!(!outcome.valid);
        assert_eq!(outcome.required_scopes, vec!["chat:admin".to_string()]);
    }

    #[tokio::test]
    async fn permissive_resolver_always_authorizes() {
        let resolver = PermissiveConfigResolver;
        let outcome = resolver
            .validate_operation_config(
                &Value::Null,
                &OperationContext {
                    operation_type: "tool_call".to_string(),
                    target_agent: "assistant".to_string(),
                    target_tool: None,
                    required_scopes: vec!["anything".to_string()],
                },
            )
            .await
            .unwrap();
        assert!(outcome.valid);
    }
}
