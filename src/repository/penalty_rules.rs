use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::map_db_error;
use crate::error::{AppError, AppResult};
use crate::models::{PenaltyRule, FINANCIAL_YEAR_ALL};
use crate::schemas::{clamp_limit, CreatePenaltyRuleInput, PenaltyRulesQuery};

const RULE_COLUMNS: &str = "id, financial_year, penalty_type, penalty_value, penalty_frequency, \
     penalty_base, max_penalty_amount, interest_type, interest_value, interest_frequency, \
     interest_base, max_interest_amount, grace_period_days, effective_from, effective_to, \
     is_active, created_at";

/// Picks the rule governing a demand: an exact financial-year match wins
/// over the ALL wildcard, then the most recently effective row wins.
pub async fn resolve_for(
    pool: &PgPool,
    financial_year: &str,
    on_date: NaiveDate,
) -> AppResult<Option<PenaltyRule>> {
    let query = format!(
        "SELECT {RULE_COLUMNS}
         FROM penalty_rules
         WHERE is_active = TRUE
           AND (financial_year = $1 OR financial_year = $2)
           AND effective_from <= $3
           AND (effective_to IS NULL OR effective_to >= $3)
         ORDER BY (financial_year = $1) DESC, effective_from DESC, created_at DESC
         LIMIT 1"
    );
    sqlx::query_as::<_, PenaltyRule>(&query)
        .bind(financial_year)
        .bind(FINANCIAL_YEAR_ALL)
        .bind(on_date)
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)
}

pub async fn get(pool: &PgPool, rule_id: Uuid) -> AppResult<PenaltyRule> {
    let query = format!("SELECT {RULE_COLUMNS} FROM penalty_rules WHERE id = $1 LIMIT 1");
    sqlx::query_as::<_, PenaltyRule>(&query)
        .bind(rule_id)
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| AppError::NotFound("Penalty rule record not found.".to_string()))
}

pub async fn insert(pool: &PgPool, input: &CreatePenaltyRuleInput) -> AppResult<PenaltyRule> {
    let query = format!(
        "INSERT INTO penalty_rules (id, financial_year, penalty_type, penalty_value, \
             penalty_frequency, penalty_base, max_penalty_amount, interest_type, interest_value, \
             interest_frequency, interest_base, max_interest_amount, grace_period_days, \
             effective_from, effective_to, is_active, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, TRUE, NOW())
         RETURNING {RULE_COLUMNS}"
    );
    sqlx::query_as::<_, PenaltyRule>(&query)
        .bind(Uuid::new_v4())
        .bind(input.financial_year.trim())
        .bind(input.penalty_type)
        .bind(input.penalty_value)
        .bind(input.penalty_frequency)
        .bind(input.penalty_base)
        .bind(input.max_penalty_amount)
        .bind(input.interest_type)
        .bind(input.interest_value)
        .bind(input.interest_frequency)
        .bind(input.interest_base)
        .bind(input.max_interest_amount)
        .bind(input.grace_period_days)
        .bind(input.effective_from)
        .bind(input.effective_to)
        .fetch_one(pool)
        .await
        .map_err(map_db_error)
}

pub async fn list(pool: &PgPool, query: &PenaltyRulesQuery) -> AppResult<Vec<PenaltyRule>> {
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {RULE_COLUMNS} FROM penalty_rules WHERE 1 = 1"));
    if !query.include_inactive {
        builder.push(" AND is_active = TRUE");
    }
    if let Some(financial_year) = query
        .financial_year
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        builder.push(" AND financial_year = ").push_bind(financial_year.to_owned());
    }
    builder
        .push(" ORDER BY effective_from DESC, created_at DESC LIMIT ")
        .push_bind(clamp_limit(query.limit));

    builder
        .build_query_as::<PenaltyRule>()
        .fetch_all(pool)
        .await
        .map_err(map_db_error)
}
