use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::model::{EpochMillis, MonthlyUsage, TokenTransaction};
use crate::repository::UsageRepository;

#[derive(Default)]
pub struct InMemoryUsageRepository {
    monthly: Mutex<HashMap<(String, String), MonthlyUsage>>,
    transactions: Mutex<Vec<TokenTransaction>>,
}

impl InMemoryUsageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageRepository for InMemoryUsageRepository {
    async fn upsert_monthly_usage(
        &self,
        user_id: &str,
        month: &str,
        transaction: &TokenTransaction,
    ) -> Result<MonthlyUsage, GatewayError> {
        let mut monthly = self.monthly.lock().unwrap();
        let key = (user_id.to_string(), month.to_string());
        let now = EpochMillis::now();
        let entry = monthly.entry(key).or_insert_with(|| MonthlyUsage {
            user_id: user_id.to_string(),
            month: month.to_string(),
            total_usage: 0,
            prompt_usage: 0,
            completion_usage: 0,
            cached_usage: 0,
            usage_by_model: HashMap::new(),
            usage_by_source: HashMap::new(),
            created_at: now,
            updated_at: now,
        });
        entry.total_usage += transaction.token_cost;
        match transaction.transaction_type {
            crate::model::TransactionType::Prompt => entry.prompt_usage += transaction.token_cost,
            crate::model::TransactionType::Completion => {
                entry.completion_usage += transaction.token_cost
            }
            crate::model::TransactionType::Cached => entry.cached_usage += transaction.token_cost,
        }
        *entry.usage_by_model.entry(transaction.model.clone()).or_insert(0) += transaction.token_cost;
        *entry.usage_by_source.entry(transaction.source.clone()).or_insert(0) += transaction.token_cost;
        entry.updated_at = now;
        Ok(entry.clone())
    }

    async fn record_transaction(
        &self,
        transaction: TokenTransaction,
    ) -> Result<TokenTransaction, GatewayError> {
        self.transactions.lock().unwrap().push(transaction.clone());
        Ok(transaction)
    }

    async fn find_monthly_usage(
        &self,
        user_id: &str,
        month: &str,
    ) -> Result<Option<MonthlyUsage>, GatewayError> {
        Ok(self
            .monthly
            .lock()
            .unwrap()
            .get(&(user_id.to_string(), month.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransactionType;

    #[tokio::test]
    async fn upserts_accumulate_per_month() {
        let repo = InMemoryUsageRepository::new();
        let txn = TokenTransaction {
            id: "tx1".to_string(),
            user_id: "u1".to_string(),
            task_id: None,
            transaction_type: TransactionType::Prompt,
            model: "gpt".to_string(),
            raw_tokens: 100,
            token_cost: 50,
            rate: 0.5,
            source: "chat".to_string(),
            tool_name: None,
            context: None,
            created_at: EpochMillis::now(),
        };
        repo.upsert_monthly_usage("u1", "2026-07", &txn).await.unwrap();
        let usage = repo
            .upsert_monthly_usage("u1", "2026-07", &txn)
            .await
            .unwrap();
        assert_eq!(usage.total_usage, 100);
        assert_eq!(usage.prompt_usage, 100);
    }
}
