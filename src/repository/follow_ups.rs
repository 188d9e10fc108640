use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::map_db_error;
use crate::error::AppResult;
use crate::models::FollowUp;

const FOLLOW_UP_COLUMNS: &str = "id, demand_id, visit_count, last_visit_date, last_visit_id, \
     last_visit_type, last_citizen_response, expected_payment_date, escalation_level, \
     escalation_status, is_enforcement_eligible, enforcement_eligible_date, notice_triggered, \
     notice_id, is_resolved, resolved_date, resolved_by, priority, next_follow_up_date, \
     created_at, updated_at";

pub async fn get_by_demand(pool: &PgPool, demand_id: Uuid) -> AppResult<Option<FollowUp>> {
    let query = format!("SELECT {FOLLOW_UP_COLUMNS} FROM follow_ups WHERE demand_id = $1 LIMIT 1");
    sqlx::query_as::<_, FollowUp>(&query)
        .bind(demand_id)
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)
}

/// Returns the demand's follow-up row locked for this transaction,
/// creating the zero-state row on first contact. The lock serializes
/// concurrent visit submissions for the same demand.
pub async fn get_or_create_for_update(
    conn: &mut PgConnection,
    demand_id: Uuid,
) -> AppResult<FollowUp> {
    sqlx::query(
        "INSERT INTO follow_ups (id, demand_id, visit_count, escalation_level, \
             escalation_status, is_enforcement_eligible, notice_triggered, is_resolved, \
             priority, created_at, updated_at)
         VALUES ($1, $2, 0, 0, 'none', FALSE, FALSE, FALSE, 'low', NOW(), NOW())
         ON CONFLICT (demand_id) DO NOTHING",
    )
    .bind(Uuid::new_v4())
    .bind(demand_id)
    .execute(&mut *conn)
    .await
    .map_err(map_db_error)?;

    let query = format!("SELECT {FOLLOW_UP_COLUMNS} FROM follow_ups WHERE demand_id = $1 FOR UPDATE");
    sqlx::query_as::<_, FollowUp>(&query)
        .bind(demand_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(map_db_error)
}

/// First-encounter row created by the task synthesizer, priority seeded
/// from the demand's overdue age. Loses the race silently when a visit
/// created the row first.
pub async fn seed_for_demand(
    pool: &PgPool,
    demand_id: Uuid,
    priority: crate::models::TaskPriority,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO follow_ups (id, demand_id, visit_count, escalation_level, \
             escalation_status, is_enforcement_eligible, notice_triggered, is_resolved, \
             priority, created_at, updated_at)
         VALUES ($1, $2, 0, 0, 'none', FALSE, FALSE, FALSE, $3, NOW(), NOW())
         ON CONFLICT (demand_id) DO NOTHING",
    )
    .bind(Uuid::new_v4())
    .bind(demand_id)
    .bind(priority)
    .execute(pool)
    .await
    .map_err(map_db_error)?;
    Ok(())
}

/// Writes every mutable column back from the recomputed state.
pub async fn persist_visit_outcome_tx(
    conn: &mut PgConnection,
    follow_up: &FollowUp,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE follow_ups
         SET visit_count = $2,
             last_visit_date = $3,
             last_visit_id = $4,
             last_visit_type = $5,
             last_citizen_response = $6,
             expected_payment_date = $7,
             escalation_level = $8,
             escalation_status = $9,
             is_enforcement_eligible = $10,
             enforcement_eligible_date = $11,
             notice_triggered = $12,
             notice_id = $13,
             is_resolved = $14,
             resolved_date = $15,
             resolved_by = $16,
             priority = $17,
             next_follow_up_date = $18,
             updated_at = NOW()
         WHERE id = $1",
    )
    .bind(follow_up.id)
    .bind(follow_up.visit_count)
    .bind(follow_up.last_visit_date)
    .bind(follow_up.last_visit_id)
    .bind(follow_up.last_visit_type)
    .bind(follow_up.last_citizen_response)
    .bind(follow_up.expected_payment_date)
    .bind(follow_up.escalation_level)
    .bind(follow_up.escalation_status)
    .bind(follow_up.is_enforcement_eligible)
    .bind(follow_up.enforcement_eligible_date)
    .bind(follow_up.notice_triggered)
    .bind(follow_up.notice_id)
    .bind(follow_up.is_resolved)
    .bind(follow_up.resolved_date)
    .bind(follow_up.resolved_by)
    .bind(follow_up.priority)
    .bind(follow_up.next_follow_up_date)
    .execute(conn)
    .await
    .map_err(map_db_error)?;
    Ok(())
}

/// Inserts the one-time enforcement notice row inside the visit
/// transaction so the notice and the flag on the follow-up commit
/// together.
pub async fn insert_notice_tx(
    conn: &mut PgConnection,
    notice_id: Uuid,
    demand_id: Uuid,
    follow_up_id: Uuid,
    amount_due: Decimal,
    generated_by: Uuid,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO notices (id, demand_id, follow_up_id, notice_type, status, amount_due, \
             generated_by, created_at)
         VALUES ($1, $2, $3, 'enforcement', 'generated', $4, $5, NOW())",
    )
    .bind(notice_id)
    .bind(demand_id)
    .bind(follow_up_id)
    .bind(amount_due)
    .bind(generated_by)
    .execute(conn)
    .await
    .map_err(map_db_error)?;
    Ok(())
}
