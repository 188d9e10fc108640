use axum::{extract::State, http::HeaderMap, Json};
use serde_json::json;

use crate::{
    auth::require_admin,
    error::{AppError, AppResult},
    models::TaskOrigin,
    schemas::{RunAccrualInput, RunTaskGenerationInput},
    services::{
        accrual_cycle::{run_accrual_cycle, AccrualRunReport},
        audit::write_audit_log,
        tasks::{run_task_generation, TaskGenerationRunReport},
    },
    state::AppState,
};

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/runs/accrual", axum::routing::post(trigger_accrual))
        .route(
            "/runs/task-generation",
            axum::routing::post(trigger_task_generation),
        )
}

/// Operational recovery trigger: same routine as the scheduled run, with
/// an optional as-of date for replaying a missed day.
async fn trigger_accrual(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<RunAccrualInput>>,
) -> AppResult<Json<AccrualRunReport>> {
    let admin = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let input = payload.map(|Json(input)| input).unwrap_or_default();
    let batch_limit = input.limit.unwrap_or(state.config.accrual_batch_limit);
    let report =
        run_accrual_cycle(pool, state.config.ulb_timezone, batch_limit, input.as_of_date).await;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(admin.id),
        "accrual_run_triggered",
        "demands",
        None,
        None,
        Some(json!({
            "run_date": report.run_date,
            "scanned": report.scanned,
            "applied": report.applied,
            "skipped": report.skipped,
            "no_rule": report.no_rule,
            "errors": report.errors,
        })),
        Some("Manual accrual run"),
        Some(json!({
            "requested_as_of_date": input.as_of_date,
            "batch_limit": batch_limit,
        })),
    )
    .await;

    Ok(Json(report))
}

async fn trigger_task_generation(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<RunTaskGenerationInput>>,
) -> AppResult<Json<TaskGenerationRunReport>> {
    let admin = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let input = payload.map(|Json(input)| input).unwrap_or_default();
    let report = run_task_generation(
        pool,
        state.config.ulb_timezone,
        state.config.task_generation_collector_limit,
        input.task_date,
        TaskOrigin::Admin,
    )
    .await;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(admin.id),
        "task_generation_triggered",
        "collector_tasks",
        None,
        None,
        Some(json!({
            "task_date": report.task_date,
            "collectors": report.collectors,
            "created": report.created,
            "skipped_existing": report.skipped_existing,
            "errors": report.errors,
        })),
        Some("Manual task generation run"),
        Some(json!({
            "requested_task_date": input.task_date,
            "collector_limit": state.config.task_generation_collector_limit,
        })),
    )
    .await;

    Ok(Json(report))
}
