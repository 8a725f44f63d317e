//! LLM cost tracking (spec §3 `MonthlyUsage`/`TokenTransaction`),
//! supplemented from `original_source`'s `usage_tracking_service.py` and
//! `token_pricing.py`: a per-model rate table converts raw token counts
//! into credits (1,000,000 credits == $1) and appends an audit row per
//! call while keeping a running per-`(user, month)` aggregate.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::model::{EpochMillis, MonthlyUsage, TokenTransaction, TransactionType};
use crate::repository::UsageRepository;

/// USD cost per 1,000 tokens for one model, broken out by transaction
/// kind (spec §4.9's LLM calls are priced the same way).
#[derive(Debug, Clone, Copy)]
pub struct ModelRate {
    pub prompt_per_1k: f64,
    pub completion_per_1k: f64,
    pub cached_per_1k: f64,
}

/// Static rate table, analogous to the original's `TOKEN_PRICING` map.
/// Unknown models fall back to `default_rate`.
pub struct PricingTable {
    rates: HashMap<String, ModelRate>,
    default_rate: ModelRate,
}

impl Default for PricingTable {
    fn default() -> Self {
        let default_rate = ModelRate {
            prompt_per_1k: 0.0015,
            completion_per_1k: 0.002,
            cached_per_1k: 0.00075,
        };
        let mut rates = HashMap::new();
        rates.insert(
            "gpt-4o".to_string(),
            ModelRate {
                prompt_per_1k: 0.005,
                completion_per_1k: 0.015,
                cached_per_1k: 0.0025,
            },
        );
        rates.insert(
            "gpt-4o-mini".to_string(),
            ModelRate {
                prompt_per_1k: 0.00015,
                completion_per_1k: 0.0006,
                cached_per_1k: 0.000075,
            },
        );
        Self { rates, default_rate }
    }
}

impl PricingTable {
    pub fn rate_for(&self, model: &str) -> ModelRate {
        self.rates.get(model).copied().unwrap_or(self.default_rate)
    }

    /// USD per 1,000 tokens for the transaction kind, converted to
    /// credits-per-token (1,000,000 credits == $1).
    pub fn credits_per_token(&self, model: &str, kind: TransactionType) -> f64 {
        let rate = self.rate_for(model);
        let usd_per_1k = match kind {
            TransactionType::Prompt => rate.prompt_per_1k,
            TransactionType::Completion => rate.completion_per_1k,
            TransactionType::Cached => rate.cached_per_1k,
        };
        (usd_per_1k / 1000.0) * 1_000_000.0
    }
}

pub struct UsageTrackingService {
    repo: Arc<dyn UsageRepository>,
    pricing: PricingTable,
}

impl UsageTrackingService {
    pub fn new(repo: Arc<dyn UsageRepository>, pricing: PricingTable) -> Self {
        Self { repo, pricing }
    }

    /// Records one LLM call: appends a `TokenTransaction` and folds its
    /// cost into the `(user, month)` aggregate, returning both (spec §3).
    #[allow(clippy::too_many_arguments)]
    pub async fn record_usage(
        &self,
        user_id: &str,
        task_id: Option<String>,
        transaction_type: TransactionType,
        model: &str,
        raw_tokens: i64,
        source: &str,
        tool_name: Option<String>,
        context: Option<String>,
    ) -> Result<(TokenTransaction, MonthlyUsage), GatewayError> {
        let rate = self.pricing.credits_per_token(model, transaction_type);
        let token_cost = (raw_tokens as f64 * rate).round() as i64;
        let now = EpochMillis::now();
        let transaction = TokenTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            task_id,
            transaction_type,
            model: model.to_string(),
            raw_tokens,
            token_cost,
            rate,
            source: source.to_string(),
            tool_name,
            context,
            created_at: now,
        };
        let recorded = self.repo.record_transaction(transaction).await?;
        let month = month_key(now);
        let monthly = self.repo.upsert_monthly_usage(user_id, &month, &recorded).await?;
        Ok((recorded, monthly))
    }

    pub async fn monthly_usage(
        &self,
        user_id: &str,
        month: &str,
    ) -> Result<Option<MonthlyUsage>, GatewayError> {
        self.repo.find_monthly_usage(user_id, month).await
    }
}

/// `YYYY-MM` for the current month, used as the aggregate key.
fn month_key(now: EpochMillis) -> String {
    use chrono::TimeZone;
    chrono::Utc
        .timestamp_millis_opt(now.0)
        .single()
        .map(|dt| dt.format("%Y-%m").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::InMemoryUsageRepository;

    #[tokio::test]
    async fn recording_usage_accumulates_the_monthly_aggregate() {
        let service = UsageTrackingService::new(
            Arc::new(InMemoryUsageRepository::new()),
            PricingTable::default(),
        );
        let (_txn, monthly) = service
            .record_usage(
                "u1",
                Some("t1".to_string()),
                TransactionType::Prompt,
                "gpt-4o-mini",
                1000,
                "chat",
                None,
                None,
            )
            .await
            .unwrap();
        assert!(monthly.total_usage > 0);
        assert_eq!(monthly.prompt_usage, monthly.total_usage);
    }

    #[test]
    fn unknown_model_uses_default_rate() {
        let pricing = PricingTable::default();
        let known = pricing.credits_per_token("gpt-4o", TransactionType::Prompt);
        let unknown = pricing.credits_per_token("some-unlisted-model", TransactionType::Prompt);
        assert_ne!(known, unknown);
    }
}
