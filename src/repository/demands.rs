use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::map_db_error;
use crate::error::{AppError, AppResult};
use crate::models::{Demand, DemandStatus, PropertySummary};

const DEMAND_COLUMNS: &str = "id, demand_number, property_id, financial_year, tax_type, \
     base_amount, arrears_amount, penalty_amount, interest_amount, total_amount, paid_amount, \
     balance_amount, due_date, status, overdue_days, last_penalty_applied_at, penalty_breakdown, \
     created_at, updated_at";

pub async fn get(pool: &PgPool, demand_id: Uuid) -> AppResult<Demand> {
    let query = format!("SELECT {DEMAND_COLUMNS} FROM demands WHERE id = $1 LIMIT 1");
    sqlx::query_as::<_, Demand>(&query)
        .bind(demand_id)
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| AppError::NotFound("Demand record not found.".to_string()))
}

/// Locks the demand row for the remainder of the transaction.
pub async fn get_for_update(conn: &mut PgConnection, demand_id: Uuid) -> AppResult<Demand> {
    let query = format!("SELECT {DEMAND_COLUMNS} FROM demands WHERE id = $1 FOR UPDATE");
    sqlx::query_as::<_, Demand>(&query)
        .bind(demand_id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| AppError::NotFound("Demand record not found.".to_string()))
}

pub async fn property_for_demand(pool: &PgPool, demand_id: Uuid) -> AppResult<PropertySummary> {
    sqlx::query_as::<_, PropertySummary>(
        "SELECT p.id, p.property_number, p.owner_name, p.owner_phone, p.address, p.ward_id
         FROM properties p
         JOIN demands d ON d.property_id = p.id
         WHERE d.id = $1
         LIMIT 1",
    )
    .bind(demand_id)
    .fetch_optional(pool)
    .await
    .map_err(map_db_error)?
    .ok_or_else(|| AppError::NotFound("Property record not found for demand.".to_string()))
}

/// One page of demands past their due date with money still owed, oldest
/// first. Returns `(due_date, id)` keys so the caller can resume past the
/// page; neither column changes during a run, so the cursor stays stable
/// even while accrual rewrites the rows it visits. Grace periods are
/// applied later by the calculator, so this scan intentionally
/// over-selects.
pub async fn list_accrual_candidates_page(
    pool: &PgPool,
    overdue_before: NaiveDate,
    resume_after: Option<(NaiveDate, Uuid)>,
    page_size: i64,
) -> AppResult<Vec<(NaiveDate, Uuid)>> {
    let (after_date, after_id) = resume_after.unzip();
    sqlx::query_as::<_, (NaiveDate, Uuid)>(
        "SELECT due_date, id
         FROM demands
         WHERE status IN ('pending', 'partially_paid', 'overdue')
           AND balance_amount > 0
           AND due_date < $1
           AND ($2::date IS NULL OR (due_date, id) > ($2, $3))
         ORDER BY due_date ASC, id ASC
         LIMIT $4",
    )
    .bind(overdue_before)
    .bind(after_date)
    .bind(after_id)
    .bind(page_size.clamp(1, 50_000))
    .fetch_all(pool)
    .await
    .map_err(map_db_error)
}

#[allow(clippy::too_many_arguments)]
pub async fn apply_accrual_tx(
    conn: &mut PgConnection,
    demand_id: Uuid,
    penalty_amount: Decimal,
    interest_amount: Decimal,
    total_amount: Decimal,
    balance_amount: Decimal,
    status: DemandStatus,
    overdue_days: i32,
    applied_at: DateTime<Utc>,
    breakdown_entry: &Value,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE demands
         SET penalty_amount = $2,
             interest_amount = $3,
             total_amount = $4,
             balance_amount = $5,
             status = $6,
             overdue_days = $7,
             last_penalty_applied_at = $8,
             penalty_breakdown = COALESCE(penalty_breakdown, '[]'::jsonb) || $9,
             updated_at = NOW()
         WHERE id = $1",
    )
    .bind(demand_id)
    .bind(penalty_amount)
    .bind(interest_amount)
    .bind(total_amount)
    .bind(balance_amount)
    .bind(status)
    .bind(overdue_days)
    .bind(applied_at)
    .bind(breakdown_entry)
    .execute(conn)
    .await
    .map_err(map_db_error)?;
    Ok(())
}

pub async fn apply_payment_tx(
    conn: &mut PgConnection,
    demand_id: Uuid,
    paid_amount: Decimal,
    balance_amount: Decimal,
    status: DemandStatus,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE demands
         SET paid_amount = $2,
             balance_amount = $3,
             status = $4,
             updated_at = NOW()
         WHERE id = $1",
    )
    .bind(demand_id)
    .bind(paid_amount)
    .bind(balance_amount)
    .bind(status)
    .execute(conn)
    .await
    .map_err(map_db_error)?;
    Ok(())
}
