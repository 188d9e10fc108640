use std::time::Duration;

use chrono::{Datelike, Timelike, Utc};
use tokio::time::sleep;

use crate::models::TaskOrigin;
use crate::state::AppState;

/// Spawn the background scheduler that runs the two daily jobs.
///
/// Each job runs in its own `tokio::spawn` so a failure in one job
/// never crashes the scheduler loop or the other job.
pub async fn run_background_scheduler(state: AppState) {
    tracing::info!("Background scheduler started");

    let pool = match state.db_pool.as_ref() {
        Some(p) => p.clone(),
        None => {
            tracing::warn!("Scheduler: no database pool configured, exiting");
            return;
        }
    };

    let tz = state.config.ulb_timezone;
    let accrual_hour = state.config.accrual_run_hour;
    let task_generation_hour = state.config.task_generation_run_hour;

    // Civil time in the ULB timezone drives both per-day guards, so the
    // jobs fire on local calendar days even across a UTC midnight.
    let mut last_accrual_run: Option<u32> = None;
    let mut last_task_generation_run: Option<u32> = None;

    loop {
        sleep(Duration::from_secs(15)).await;

        let now_local = Utc::now().with_timezone(&tz);
        let today_ordinal = now_local.date_naive().ordinal();

        if last_accrual_run != Some(today_ordinal) && now_local.hour() >= accrual_hour {
            last_accrual_run = Some(today_ordinal);
            let pool = pool.clone();
            let batch_limit = state.config.accrual_batch_limit;
            tokio::spawn(async move {
                let report =
                    crate::services::accrual_cycle::run_accrual_cycle(&pool, tz, batch_limit, None)
                        .await;
                tracing::info!(
                    run_date = %report.run_date,
                    scanned = report.scanned,
                    applied = report.applied,
                    skipped = report.skipped,
                    no_rule = report.no_rule,
                    errors = report.errors,
                    "Scheduler: accrual cycle completed"
                );
            });
        }

        if last_task_generation_run != Some(today_ordinal)
            && now_local.hour() >= task_generation_hour
        {
            last_task_generation_run = Some(today_ordinal);
            let pool = pool.clone();
            let collector_limit = state.config.task_generation_collector_limit;
            tokio::spawn(async move {
                let report = crate::services::tasks::run_task_generation(
                    &pool,
                    tz,
                    collector_limit,
                    None,
                    TaskOrigin::System,
                )
                .await;
                tracing::info!(
                    task_date = %report.task_date,
                    collectors = report.collectors,
                    created = report.created,
                    skipped_existing = report.skipped_existing,
                    errors = report.errors,
                    "Scheduler: task generation completed"
                );
            });
        }
    }
}
