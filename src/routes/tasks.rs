use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    auth::{assert_role, require_collector, ROLE_ADMIN},
    error::{AppError, AppResult},
    models::{CollectorTask, Employee, TaskOrigin},
    repository::collector_tasks,
    schemas::{validate_input, CompleteTaskInput, TaskPath, TasksQuery},
    services::{audit::write_audit_log, tasks::generate_tasks_for_collector},
    state::AppState,
    wards::assigned_wards,
};

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/tasks/daily", axum::routing::get(daily_tasks))
        .route("/tasks/{task_id}/start", axum::routing::post(start_task))
        .route(
            "/tasks/{task_id}/complete",
            axum::routing::post(complete_task),
        )
}

async fn daily_tasks(
    State(state): State<AppState>,
    Query(query): Query<TasksQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let employee = require_collector(&state, &headers).await?;
    let pool = db_pool(&state)?;

    // Admins may inspect another collector's list, collectors only their
    // own.
    let collector_id = match query.collector_id {
        Some(other) if other != employee.id => {
            assert_role(&employee, &[ROLE_ADMIN])?;
            other
        }
        _ => employee.id,
    };

    let task_date = query.date.unwrap_or_else(|| {
        Utc::now()
            .with_timezone(&state.config.ulb_timezone)
            .date_naive()
    });

    let mut tasks =
        collector_tasks::list_for_collector(pool, collector_id, task_date, query.status, query.limit)
            .await?;

    // First request of the day synthesizes the list; the scheduled run and
    // this path share one routine, so whoever gets there first wins.
    if tasks.is_empty() && query.status.is_none() {
        let wards = assigned_wards(&state, collector_id).await?;
        let report = generate_tasks_for_collector(
            pool,
            collector_id,
            wards.as_slice(),
            task_date,
            TaskOrigin::System,
        )
        .await;
        // The scheduled run may have filled the slots between the two
        // reads; skipped slots mean tasks exist and deserve a re-list.
        if report.tasks_exist() {
            tasks = collector_tasks::list_for_collector(
                pool,
                collector_id,
                task_date,
                query.status,
                query.limit,
            )
            .await?;
        }
    }

    if tasks.is_empty() {
        return Ok(Json(json!({
            "data": [],
            "count": 0,
            "task_date": task_date,
            "message": "No eligible demands in the assigned wards for this date.",
        })));
    }

    let count = tasks.len();
    Ok(Json(json!({
        "data": tasks,
        "count": count,
        "task_date": task_date,
    })))
}

fn ensure_task_owner(employee: &Employee, task: &CollectorTask) -> AppResult<()> {
    if employee.role == ROLE_ADMIN || task.collector_id == employee.id {
        return Ok(());
    }
    Err(AppError::Forbidden(
        "Task belongs to another collector.".to_string(),
    ))
}

async fn start_task(
    State(state): State<AppState>,
    Path(path): Path<TaskPath>,
    headers: HeaderMap,
) -> AppResult<Json<CollectorTask>> {
    let employee = require_collector(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let task = collector_tasks::get(pool, path.task_id).await?;
    ensure_task_owner(&employee, &task)?;

    match collector_tasks::set_in_progress(pool, path.task_id).await? {
        Some(updated) => Ok(Json(updated)),
        None => Err(AppError::Conflict(format!(
            "Task cannot be started from status '{}'.",
            task.status.as_str()
        ))),
    }
}

async fn complete_task(
    State(state): State<AppState>,
    Path(path): Path<TaskPath>,
    headers: HeaderMap,
    payload: Option<Json<CompleteTaskInput>>,
) -> AppResult<Json<CollectorTask>> {
    let employee = require_collector(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let task = collector_tasks::get(pool, path.task_id).await?;
    ensure_task_owner(&employee, &task)?;

    if let Some(Json(input)) = &payload {
        validate_input(input)?;
    }
    let notes = payload.as_ref().and_then(|input| input.notes.as_deref());

    match collector_tasks::set_completed(pool, path.task_id, notes).await? {
        Some(updated) => {
            write_audit_log(
                state.db_pool.as_ref(),
                Some(employee.id),
                "task_completed",
                "collector_tasks",
                Some(updated.id),
                Some(json!({ "status": task.status })),
                Some(json!({ "status": updated.status })),
                Some(&format!(
                    "Task {} ({}) completed",
                    updated.task_number,
                    updated.task_type.as_str()
                )),
                Some(json!({
                    "demand_id": updated.demand_id,
                    "task_date": updated.task_date,
                })),
            )
            .await;
            Ok(Json(updated))
        }
        // Completing a completed task is a no-op success.
        None => Ok(Json(task)),
    }
}
