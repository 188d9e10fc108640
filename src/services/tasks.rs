use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{TaskOrigin, TaskPriority, TaskType};
use crate::repository::{
    collector_tasks::{self, NewTask, TaskCandidate},
    follow_ups, next_scan_key,
};
use crate::services::accrual::raw_overdue_days;
use crate::services::followup;

/// Candidate scan page size. The scan resumes past each full page, so a
/// ward backlog deeper than one page still gets covered in a single run.
const TASK_SCAN_PAGE_SIZE: i64 = 2_000;

#[derive(Debug, serde::Serialize)]
pub struct CollectorTaskReport {
    pub collector_id: Uuid,
    pub scanned: u32,
    pub created: u32,
    pub skipped_existing: u32,
    pub errors: u32,
}

impl CollectorTaskReport {
    fn new(collector_id: Uuid) -> Self {
        Self {
            collector_id,
            scanned: 0,
            created: 0,
            skipped_existing: 0,
            errors: 0,
        }
    }

    /// True when the day's slots hold tasks after this pass, whether the
    /// pass created them or another writer got there first.
    pub fn tasks_exist(&self) -> bool {
        self.created > 0 || self.skipped_existing > 0
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TaskGenerationRunReport {
    pub task_date: NaiveDate,
    pub collectors: u32,
    pub created: u32,
    pub skipped_existing: u32,
    pub errors: u32,
    pub per_collector: Vec<CollectorTaskReport>,
}

/// What the decision list looks at for one candidate demand. Follow-up
/// fields are zeroed when the demand has never been visited.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TaskInputs {
    pub target_date: NaiveDate,
    pub due_date: NaiveDate,
    pub overdue_days: i32,
    pub visit_count: i32,
    pub is_enforcement_eligible: bool,
    pub notice_triggered: bool,
    pub expected_payment_date: Option<NaiveDate>,
    pub next_follow_up_date: Option<NaiveDate>,
}

/// Priority-ordered decision list, first match wins:
/// broken promises, due follow-ups, enforcement, chronic non-payers,
/// demands falling due today, then a plain overdue follow-up.
pub(crate) fn decide_task(inputs: &TaskInputs) -> (TaskType, TaskPriority) {
    if inputs
        .expected_payment_date
        .is_some_and(|date| date <= inputs.target_date)
    {
        return (TaskType::PromisedPayment, TaskPriority::High);
    }
    if inputs
        .next_follow_up_date
        .is_some_and(|date| date <= inputs.target_date)
    {
        let priority = if inputs.visit_count >= 2 {
            TaskPriority::High
        } else {
            TaskPriority::Medium
        };
        return (TaskType::OverdueFollowup, priority);
    }
    if inputs.is_enforcement_eligible && !inputs.notice_triggered {
        return (TaskType::EnforcementVisit, TaskPriority::Critical);
    }
    if inputs.visit_count >= 3 {
        return (TaskType::EscalationVisit, TaskPriority::Critical);
    }
    if inputs.due_date == inputs.target_date {
        return (TaskType::DueToday, TaskPriority::High);
    }
    let priority = if inputs.overdue_days > 60 {
        TaskPriority::Critical
    } else if inputs.overdue_days > 30 {
        TaskPriority::High
    } else {
        TaskPriority::Medium
    };
    (TaskType::OverdueFollowup, priority)
}

pub(crate) fn action_text(task_type: TaskType, amount_due: Decimal, overdue_days: i32) -> String {
    match task_type {
        TaskType::PromisedPayment => {
            format!("Collect the payment of {amount_due} promised by the citizen.")
        }
        TaskType::OverdueFollowup => format!(
            "Follow up on the overdue balance of {amount_due} ({overdue_days} days past due)."
        ),
        TaskType::EnforcementVisit => {
            format!("Serve the enforcement notice; a balance of {amount_due} remains unpaid.")
        }
        TaskType::EscalationVisit => format!(
            "Escalation visit required; a balance of {amount_due} is {overdue_days} days past due."
        ),
        TaskType::DueToday => {
            format!("Demand of {amount_due} falls due today; collect or remind.")
        }
    }
}

/// Synthesizes the daily list for one collector. Shared by the lazy
/// on-request path and the scheduled run so both produce identical tasks.
pub async fn generate_tasks_for_collector(
    pool: &PgPool,
    collector_id: Uuid,
    ward_ids: &[String],
    target_date: NaiveDate,
    origin: TaskOrigin,
) -> CollectorTaskReport {
    let mut report = CollectorTaskReport::new(collector_id);
    if ward_ids.is_empty() {
        return report;
    }

    // Keyset scan: already-tasked demands still match the candidate
    // predicate, so the cursor is what moves the window past them.
    let mut cursor: Option<(NaiveDate, Uuid)> = None;
    loop {
        let page = match collector_tasks::list_candidates_for_wards(
            pool,
            ward_ids,
            target_date,
            cursor,
            TASK_SCAN_PAGE_SIZE,
        )
        .await
        {
            Ok(page) => page,
            Err(error) => {
                warn!(
                    collector_id = %collector_id,
                    error = %error,
                    "Task generation could not scan candidate demands"
                );
                report.errors += 1;
                break;
            }
        };
        report.scanned += page.len() as u32;

        for candidate in &page {
            match synthesize_one(pool, collector_id, candidate, target_date, origin).await {
                Ok(true) => report.created += 1,
                Ok(false) => report.skipped_existing += 1,
                Err(error) => {
                    warn!(
                        collector_id = %collector_id,
                        demand_id = %candidate.demand_id,
                        error = %error,
                        "Task synthesis failed for demand"
                    );
                    report.errors += 1;
                }
            }
        }

        cursor = next_scan_key(&page, TASK_SCAN_PAGE_SIZE, |row| (row.due_date, row.demand_id));
        if cursor.is_none() {
            break;
        }
    }

    info!(
        collector_id = %collector_id,
        task_date = %target_date,
        scanned = report.scanned,
        created = report.created,
        skipped_existing = report.skipped_existing,
        errors = report.errors,
        "Task generation completed for collector"
    );
    report
}

async fn synthesize_one(
    pool: &PgPool,
    collector_id: Uuid,
    candidate: &TaskCandidate,
    target_date: NaiveDate,
    origin: TaskOrigin,
) -> AppResult<bool> {
    let overdue_days = raw_overdue_days(candidate.due_date, target_date);

    // First encounter creates the follow-up so later visits start from a
    // consistent row.
    let visit_count = match candidate.visit_count {
        Some(count) => count,
        None => {
            follow_ups::seed_for_demand(
                pool,
                candidate.demand_id,
                followup::priority_for(0, overdue_days),
            )
            .await?;
            0
        }
    };

    let inputs = TaskInputs {
        target_date,
        due_date: candidate.due_date,
        overdue_days,
        visit_count,
        is_enforcement_eligible: candidate.is_enforcement_eligible.unwrap_or(false),
        notice_triggered: candidate.notice_triggered.unwrap_or(false),
        expected_payment_date: candidate.expected_payment_date,
        next_follow_up_date: candidate.next_follow_up_date,
    };
    let (task_type, priority) = decide_task(&inputs);

    let task = NewTask {
        collector_id,
        demand_id: candidate.demand_id,
        task_date: target_date,
        task_type,
        priority,
        action_required: action_text(task_type, candidate.balance_amount, overdue_days),
        citizen_name: candidate.owner_name.clone(),
        property_address: candidate.property_address.clone(),
        ward_id: candidate.ward_id.clone(),
        tax_type: candidate.tax_type,
        amount_due: candidate.balance_amount,
        generated_by: origin,
    };
    collector_tasks::insert_task(pool, &task).await
}

/// Scheduled daily run over every active collector with active ward
/// assignments.
pub async fn run_task_generation(
    pool: &PgPool,
    tz: Tz,
    collector_limit: i64,
    task_date: Option<NaiveDate>,
    origin: TaskOrigin,
) -> TaskGenerationRunReport {
    let task_date = task_date.unwrap_or_else(|| Utc::now().with_timezone(&tz).date_naive());
    let collector_cap = usize::try_from(collector_limit.max(1)).unwrap_or(usize::MAX);
    let mut report = TaskGenerationRunReport {
        task_date,
        collectors: 0,
        created: 0,
        skipped_existing: 0,
        errors: 0,
        per_collector: Vec::new(),
    };

    let assignments = match collector_tasks::list_active_collector_wards(pool).await {
        Ok(assignments) => assignments,
        Err(error) => {
            warn!(error = %error, "Task generation could not list collector assignments");
            report.errors += 1;
            return report;
        }
    };

    let mut wards_by_collector: BTreeMap<Uuid, Vec<String>> = BTreeMap::new();
    for (collector_id, ward_id) in assignments {
        wards_by_collector.entry(collector_id).or_default().push(ward_id);
    }

    for (collector_id, ward_ids) in wards_by_collector.into_iter().take(collector_cap) {
        let collector_report =
            generate_tasks_for_collector(pool, collector_id, &ward_ids, task_date, origin).await;
        report.collectors += 1;
        report.created += collector_report.created;
        report.skipped_existing += collector_report.skipped_existing;
        report.errors += collector_report.errors;
        report.per_collector.push(collector_report);
    }

    info!(
        task_date = %task_date,
        collectors = report.collectors,
        created = report.created,
        skipped_existing = report.skipped_existing,
        errors = report.errors,
        "Task generation run completed"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn base_inputs(target: NaiveDate) -> TaskInputs {
        TaskInputs {
            target_date: target,
            due_date: date(2026, 1, 1),
            overdue_days: 20,
            visit_count: 0,
            is_enforcement_eligible: false,
            notice_triggered: false,
            expected_payment_date: None,
            next_follow_up_date: None,
        }
    }

    #[test]
    fn broken_promise_outranks_everything() {
        let target = date(2026, 3, 10);
        let mut inputs = base_inputs(target);
        inputs.expected_payment_date = Some(date(2026, 3, 9));
        inputs.is_enforcement_eligible = true;
        inputs.visit_count = 4;
        assert_eq!(
            decide_task(&inputs),
            (TaskType::PromisedPayment, TaskPriority::High)
        );
    }

    #[test]
    fn future_promise_does_not_trigger() {
        let target = date(2026, 3, 10);
        let mut inputs = base_inputs(target);
        inputs.expected_payment_date = Some(date(2026, 3, 12));
        assert_eq!(
            decide_task(&inputs),
            (TaskType::OverdueFollowup, TaskPriority::Medium)
        );
    }

    #[test]
    fn due_follow_up_priority_scales_with_visits() {
        let target = date(2026, 3, 10);
        let mut inputs = base_inputs(target);
        inputs.next_follow_up_date = Some(target);
        assert_eq!(
            decide_task(&inputs),
            (TaskType::OverdueFollowup, TaskPriority::Medium)
        );

        inputs.visit_count = 2;
        assert_eq!(
            decide_task(&inputs),
            (TaskType::OverdueFollowup, TaskPriority::High)
        );
    }

    #[test]
    fn enforcement_until_notice_is_served() {
        let target = date(2026, 3, 10);
        let mut inputs = base_inputs(target);
        inputs.is_enforcement_eligible = true;
        assert_eq!(
            decide_task(&inputs),
            (TaskType::EnforcementVisit, TaskPriority::Critical)
        );

        inputs.notice_triggered = true;
        inputs.visit_count = 4;
        assert_eq!(
            decide_task(&inputs),
            (TaskType::EscalationVisit, TaskPriority::Critical)
        );
    }

    #[test]
    fn due_today_beats_the_fallback() {
        let target = date(2026, 3, 10);
        let mut inputs = base_inputs(target);
        inputs.due_date = target;
        inputs.overdue_days = 0;
        assert_eq!(decide_task(&inputs), (TaskType::DueToday, TaskPriority::High));
    }

    #[test]
    fn fallback_priority_follows_overdue_days() {
        let target = date(2026, 3, 10);
        let mut inputs = base_inputs(target);

        inputs.overdue_days = 15;
        assert_eq!(
            decide_task(&inputs),
            (TaskType::OverdueFollowup, TaskPriority::Medium)
        );

        inputs.overdue_days = 31;
        assert_eq!(
            decide_task(&inputs),
            (TaskType::OverdueFollowup, TaskPriority::High)
        );

        inputs.overdue_days = 61;
        assert_eq!(
            decide_task(&inputs),
            (TaskType::OverdueFollowup, TaskPriority::Critical)
        );
    }

    #[test]
    fn action_text_names_the_amount() {
        let text = action_text(TaskType::PromisedPayment, "450.00".parse().unwrap(), 12);
        assert!(text.contains("450.00"));

        let text = action_text(TaskType::OverdueFollowup, "90.50".parse().unwrap(), 33);
        assert!(text.contains("33 days"));
    }

    // A lazy pass losing the race to the scheduled run creates nothing
    // but still finds every slot taken; the day's list exists either way.
    #[test]
    fn a_pass_that_only_skipped_still_reports_tasks() {
        let mut raced = CollectorTaskReport::new(Uuid::new_v4());
        raced.scanned = 3;
        raced.skipped_existing = 3;
        assert!(raced.tasks_exist());

        let mut fresh = CollectorTaskReport::new(Uuid::new_v4());
        fresh.scanned = 2;
        fresh.created = 2;
        assert!(fresh.tasks_exist());

        let mut barren = CollectorTaskReport::new(Uuid::new_v4());
        barren.errors = 1;
        assert!(!barren.tasks_exist());
    }
}
