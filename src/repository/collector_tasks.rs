use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{map_db_error, retry_on_conflict};
use crate::error::{AppError, AppResult};
use crate::models::{
    CollectorTask, EscalationStatus, TaskOrigin, TaskPriority, TaskStatus, TaskType, TaxType,
};
use crate::schemas::clamp_limit;

const TASK_COLUMNS: &str = "id, collector_id, demand_id, task_date, task_number, task_type, \
     priority, action_required, citizen_name, property_address, ward_id, tax_type, amount_due, \
     status, generated_by, is_auto_generated, completed_at, completion_notes, created_at";

/// Joined demand + follow-up + property row the synthesizer decides on.
/// Follow-up columns are NULL until the first visit creates the row.
#[derive(Debug, Clone, FromRow)]
pub struct TaskCandidate {
    pub demand_id: Uuid,
    pub due_date: NaiveDate,
    pub balance_amount: Decimal,
    pub overdue_days: i32,
    pub tax_type: TaxType,
    pub ward_id: String,
    pub owner_name: String,
    pub property_address: Option<String>,
    pub visit_count: Option<i32>,
    pub escalation_status: Option<EscalationStatus>,
    pub is_enforcement_eligible: Option<bool>,
    pub notice_triggered: Option<bool>,
    pub expected_payment_date: Option<NaiveDate>,
    pub next_follow_up_date: Option<NaiveDate>,
}

/// Active wards per active collector, for the generation run. Grouping
/// happens in the caller.
pub async fn list_active_collector_wards(pool: &PgPool) -> AppResult<Vec<(Uuid, String)>> {
    sqlx::query_as::<_, (Uuid, String)>(
        "SELECT wa.employee_id, wa.ward_id
         FROM ward_assignments wa
         JOIN employees e ON e.id = wa.employee_id
         WHERE wa.is_active = TRUE
           AND e.is_active = TRUE
           AND e.role = 'collector'
         ORDER BY wa.employee_id, wa.ward_id",
    )
    .fetch_all(pool)
    .await
    .map_err(map_db_error)
}

/// One page of demands in the given wards that are due on or before
/// `on_date` with money still owed and no resolved follow-up. Already
/// tasked demands still match, so the caller resumes past each full page
/// by `(due_date, id)` until the ward backlog is exhausted.
pub async fn list_candidates_for_wards(
    pool: &PgPool,
    ward_ids: &[String],
    on_date: NaiveDate,
    resume_after: Option<(NaiveDate, Uuid)>,
    page_size: i64,
) -> AppResult<Vec<TaskCandidate>> {
    let (after_date, after_id) = resume_after.unzip();
    sqlx::query_as::<_, TaskCandidate>(
        "SELECT d.id AS demand_id, d.due_date, d.balance_amount, d.overdue_days, d.tax_type,
                p.ward_id, p.owner_name, p.address AS property_address,
                f.visit_count, f.escalation_status, f.is_enforcement_eligible,
                f.notice_triggered, f.expected_payment_date, f.next_follow_up_date
         FROM demands d
         JOIN properties p ON p.id = d.property_id
         LEFT JOIN follow_ups f ON f.demand_id = d.id
         WHERE p.ward_id = ANY($1)
           AND d.status IN ('pending', 'partially_paid', 'overdue')
           AND d.balance_amount > 0
           AND (f.is_resolved IS NOT TRUE)
           AND d.due_date <= $2
           AND ($3::date IS NULL OR (d.due_date, d.id) > ($3, $4))
         ORDER BY d.due_date ASC, d.id ASC
         LIMIT $5",
    )
    .bind(ward_ids)
    .bind(on_date)
    .bind(after_date)
    .bind(after_id)
    .bind(page_size.clamp(1, 10_000))
    .fetch_all(pool)
    .await
    .map_err(map_db_error)
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub collector_id: Uuid,
    pub demand_id: Uuid,
    pub task_date: NaiveDate,
    pub task_type: TaskType,
    pub priority: TaskPriority,
    pub action_required: String,
    pub citizen_name: String,
    pub property_address: Option<String>,
    pub ward_id: String,
    pub tax_type: TaxType,
    pub amount_due: Decimal,
    pub generated_by: TaskOrigin,
}

/// Inserts one task, skipping silently when the (collector, demand, day)
/// slot is already taken. Returns whether a row was written.
///
/// Two writers can mint the same task_number for one collector and day
/// (the lazy path racing the scheduled run); the unique index on
/// (collector_id, task_date, task_number) rejects the loser, who retries
/// with a fresh number.
pub async fn insert_task(pool: &PgPool, task: &NewTask) -> AppResult<bool> {
    retry_on_conflict(3, || insert_task_once(pool, task)).await
}

async fn insert_task_once(pool: &PgPool, task: &NewTask) -> AppResult<bool> {
    let result = sqlx::query(
        "INSERT INTO collector_tasks (id, collector_id, demand_id, task_date, task_number, \
             task_type, priority, action_required, citizen_name, property_address, ward_id, \
             tax_type, amount_due, status, generated_by, is_auto_generated, created_at)
         VALUES ($1, $2, $3, $4,
             COALESCE((SELECT MAX(task_number) FROM collector_tasks \
                 WHERE collector_id = $2 AND task_date = $4), 0) + 1,
             $5, $6, $7, $8, $9, $10, $11, $12, 'pending', $13, $14, NOW())
         ON CONFLICT (collector_id, demand_id, task_date) DO NOTHING",
    )
    .bind(Uuid::new_v4())
    .bind(task.collector_id)
    .bind(task.demand_id)
    .bind(task.task_date)
    .bind(task.task_type)
    .bind(task.priority)
    .bind(&task.action_required)
    .bind(&task.citizen_name)
    .bind(task.property_address.as_deref())
    .bind(&task.ward_id)
    .bind(task.tax_type)
    .bind(task.amount_due)
    .bind(task.generated_by)
    .bind(task.generated_by == TaskOrigin::System)
    .execute(pool)
    .await
    .map_err(map_db_error)?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_for_collector(
    pool: &PgPool,
    collector_id: Uuid,
    task_date: NaiveDate,
    status: Option<TaskStatus>,
    limit: i64,
) -> AppResult<Vec<CollectorTask>> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "SELECT {TASK_COLUMNS} FROM collector_tasks WHERE collector_id = "
    ));
    builder.push_bind(collector_id);
    builder.push(" AND task_date = ").push_bind(task_date);
    if let Some(status) = status {
        builder.push(" AND status = ").push_bind(status);
    }
    builder
        .push(
            " ORDER BY CASE priority \
                 WHEN 'critical' THEN 0 \
                 WHEN 'high' THEN 1 \
                 WHEN 'medium' THEN 2 \
                 ELSE 3 END, task_number ASC LIMIT ",
        )
        .push_bind(clamp_limit(limit));

    builder
        .build_query_as::<CollectorTask>()
        .fetch_all(pool)
        .await
        .map_err(map_db_error)
}

pub async fn get(pool: &PgPool, task_id: Uuid) -> AppResult<CollectorTask> {
    let query = format!("SELECT {TASK_COLUMNS} FROM collector_tasks WHERE id = $1 LIMIT 1");
    sqlx::query_as::<_, CollectorTask>(&query)
        .bind(task_id)
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| AppError::NotFound("Task record not found.".to_string()))
}

/// Pending -> in_progress; None when the row was not in `pending`.
pub async fn set_in_progress(pool: &PgPool, task_id: Uuid) -> AppResult<Option<CollectorTask>> {
    let query = format!(
        "UPDATE collector_tasks
         SET status = 'in_progress'
         WHERE id = $1 AND status = 'pending'
         RETURNING {TASK_COLUMNS}"
    );
    sqlx::query_as::<_, CollectorTask>(&query)
        .bind(task_id)
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)
}

/// Pending/in_progress -> completed; None when already completed.
pub async fn set_completed(
    pool: &PgPool,
    task_id: Uuid,
    notes: Option<&str>,
) -> AppResult<Option<CollectorTask>> {
    let query = format!(
        "UPDATE collector_tasks
         SET status = 'completed',
             completed_at = NOW(),
             completion_notes = COALESCE($2, completion_notes)
         WHERE id = $1 AND status IN ('pending', 'in_progress')
         RETURNING {TASK_COLUMNS}"
    );
    sqlx::query_as::<_, CollectorTask>(&query)
        .bind(task_id)
        .bind(notes)
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)
}
