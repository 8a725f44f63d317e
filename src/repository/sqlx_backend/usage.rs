use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::Row;

use crate::error::{classify_db_error, GatewayError};
use crate::model::{EpochMillis, MonthlyUsage, TokenTransaction, TransactionType};
use crate::repository::UsageRepository;

use super::PgBackend;

fn transaction_type_str(t: TransactionType) -> &'static str {
    match t {
        TransactionType::Prompt => "prompt",
        TransactionType::Completion => "completion",
        TransactionType::Cached => "cached",
    }
}

fn row_to_monthly_usage(row: &sqlx::postgres::PgRow) -> Result<MonthlyUsage, GatewayError> {
    let usage_by_model: serde_json::Value = row.try_get("usage_by_model").map_err(classify_db_error)?;
    let usage_by_source: serde_json::Value = row.try_get("usage_by_source").map_err(classify_db_error)?;
    Ok(MonthlyUsage {
        user_id: row.try_get("user_id").map_err(classify_db_error)?,
        month: row.try_get("month").map_err(classify_db_error)?,
        total_usage: row.try_get("total_usage").map_err(classify_db_error)?,
        prompt_usage: row.try_get("prompt_usage").map_err(classify_db_error)?,
        completion_usage: row.try_get("completion_usage").map_err(classify_db_error)?,
        cached_usage: row.try_get("cached_usage").map_err(classify_db_error)?,
        usage_by_model: serde_json::from_value::<HashMap<String, i64>>(usage_by_model)
            .map_err(|e| GatewayError::Internal(e.to_string()))?,
        usage_by_source: serde_json::from_value::<HashMap<String, i64>>(usage_by_source)
            .map_err(|e| GatewayError::Internal(e.to_string()))?,
        created_at: EpochMillis(row.try_get("created_at").map_err(classify_db_error)?),
        updated_at: EpochMillis(row.try_get("updated_at").map_err(classify_db_error)?),
    })
}

#[async_trait]
impl UsageRepository for PgBackend {
    async fn upsert_monthly_usage(
        &self,
        user_id: &str,
        month: &str,
        transaction: &TokenTransaction,
    ) -> Result<MonthlyUsage, GatewayError> {
        let now = EpochMillis::now();
        let (prompt, completion, cached) = match transaction.transaction_type {
            TransactionType::Prompt => (transaction.token_cost, 0, 0),
            TransactionType::Completion => (0, transaction.token_cost, 0),
            TransactionType::Cached => (0, 0, transaction.token_cost),
        };
        let row = sqlx::query(
            "INSERT INTO monthly_usage (user_id, month, total_usage, prompt_usage, \
             completion_usage, cached_usage, usage_by_model, usage_by_source, created_at, updated_at) \
             VALUES ($1,$2,$3,$4,$5,$6, \
             jsonb_build_object($7::TEXT, $3::BIGINT), jsonb_build_object($8::TEXT, $3::BIGINT), \
             $9,$9) \
             ON CONFLICT (user_id, month) DO UPDATE SET \
             total_usage = monthly_usage.total_usage + EXCLUDED.total_usage, \
             prompt_usage = monthly_usage.prompt_usage + EXCLUDED.prompt_usage, \
             completion_usage = monthly_usage.completion_usage + EXCLUDED.completion_usage, \
             cached_usage = monthly_usage.cached_usage + EXCLUDED.cached_usage, \
             usage_by_model = monthly_usage.usage_by_model || \
                jsonb_build_object($7::TEXT, \
                  COALESCE((monthly_usage.usage_by_model ->> $7)::BIGINT, 0) + $3::BIGINT), \
             usage_by_source = monthly_usage.usage_by_source || \
                jsonb_build_object($8::TEXT, \
                  COALESCE((monthly_usage.usage_by_source ->> $8)::BIGINT, 0) + $3::BIGINT), \
             updated_at = EXCLUDED.updated_at \
             RETURNING *",
        )
        .bind(user_id)
        .bind(month)
        .bind(transaction.token_cost)
        .bind(prompt)
        .bind(completion)
        .bind(cached)
        .bind(&transaction.model)
        .bind(&transaction.source)
        .bind(now.0)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_db_error)?;
        row_to_monthly_usage(&row)
    }

    async fn record_transaction(
        &self,
        transaction: TokenTransaction,
    ) -> Result<TokenTransaction, GatewayError> {
        sqlx::query(
            "INSERT INTO token_transactions (id, user_id, task_id, transaction_type, model, \
             raw_tokens, token_cost, rate, source, tool_name, context, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
        )
        .bind(&transaction.id)
        .bind(&transaction.user_id)
        .bind(&transaction.task_id)
        .bind(transaction_type_str(transaction.transaction_type))
        .bind(&transaction.model)
        .bind(transaction.raw_tokens)
        .bind(transaction.token_cost)
        .bind(transaction.rate)
        .bind(&transaction.source)
        .bind(&transaction.tool_name)
        .bind(&transaction.context)
        .bind(transaction.created_at.0)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        Ok(transaction)
    }

    async fn find_monthly_usage(
        &self,
        user_id: &str,
        month: &str,
    ) -> Result<Option<MonthlyUsage>, GatewayError> {
        let row = sqlx::query("SELECT * FROM monthly_usage WHERE user_id = $1 AND month = $2")
            .bind(user_id)
            .bind(month)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_db_error)?;
        row.as_ref().map(row_to_monthly_usage).transpose()
    }
}
