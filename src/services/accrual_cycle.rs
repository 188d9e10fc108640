use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{PenaltyBreakdownEntry, PenaltyRule};
use crate::repository::{demands, next_scan_key, penalty_rules};
use crate::services::accrual::{self, AccrualChange, SkipReason};
use crate::services::audit::write_audit_log;

/// Per-item outcome detail is capped at this many entries; the counters
/// stay exact for the whole run.
const OUTCOME_DETAIL_LIMIT: usize = 1_000;

/// Result of one accrual run, with per-demand outcomes for operators.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccrualRunReport {
    pub run_date: NaiveDate,
    pub scanned: u32,
    pub applied: u32,
    pub skipped: u32,
    pub no_rule: u32,
    pub errors: u32,
    pub outcomes: Vec<AccrualItemOutcome>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AccrualItemOutcome {
    pub demand_id: Uuid,
    pub outcome: &'static str,
    pub detail: Option<String>,
}

enum ItemOutcome {
    Applied(String),
    Skipped(SkipReason),
    NoRule(String),
}

/// Daily accrual batch. Every demand runs in its own transaction so one
/// failure cannot poison the rest; rules are resolved once per financial
/// year per run.
pub async fn run_accrual_cycle(
    pool: &PgPool,
    tz: Tz,
    batch_limit: i64,
    as_of: Option<NaiveDate>,
) -> AccrualRunReport {
    let run_date = as_of.unwrap_or_else(|| Utc::now().with_timezone(&tz).date_naive());
    let mut report = AccrualRunReport {
        run_date,
        scanned: 0,
        applied: 0,
        skipped: 0,
        no_rule: 0,
        errors: 0,
        outcomes: Vec::new(),
    };

    let page_size = batch_limit.clamp(1, 50_000);
    let mut rules_by_year: HashMap<String, Option<PenaltyRule>> = HashMap::new();

    // Keyset scan: skipped demands still match the candidate predicate,
    // so the cursor, not the predicate, is what moves the window. Every
    // eligible demand is visited once per run no matter how deep the
    // backlog is.
    let mut cursor: Option<(NaiveDate, Uuid)> = None;
    loop {
        let page =
            match demands::list_accrual_candidates_page(pool, run_date, cursor, page_size).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(error = %e, "Accrual cycle: candidate scan failed");
                    report.errors += 1;
                    break;
                }
            };
        report.scanned += page.len() as u32;

        for &(_, demand_id) in &page {
            match accrue_one(pool, tz, run_date, demand_id, &mut rules_by_year).await {
                Ok(ItemOutcome::Applied(detail)) => {
                    report.applied += 1;
                    push_outcome(&mut report, demand_id, "applied", Some(detail));
                }
                Ok(ItemOutcome::Skipped(reason)) => {
                    report.skipped += 1;
                    push_outcome(
                        &mut report,
                        demand_id,
                        "skipped",
                        Some(reason.as_str().to_string()),
                    );
                }
                Ok(ItemOutcome::NoRule(financial_year)) => {
                    report.no_rule += 1;
                    push_outcome(
                        &mut report,
                        demand_id,
                        "no_rule",
                        Some(format!(
                            "no active penalty rule for financial year {financial_year}"
                        )),
                    );
                }
                Err(e) => {
                    warn!(demand_id = %demand_id, error = %e, "Accrual cycle: demand failed");
                    report.errors += 1;
                    push_outcome(&mut report, demand_id, "error", Some(e.to_string()));
                }
            }
        }

        cursor = next_scan_key(&page, page_size, |&key| key);
        if cursor.is_none() {
            break;
        }
    }

    info!(
        run_date = %report.run_date,
        scanned = report.scanned,
        applied = report.applied,
        skipped = report.skipped,
        no_rule = report.no_rule,
        errors = report.errors,
        "Accrual cycle completed"
    );

    report
}

fn push_outcome(
    report: &mut AccrualRunReport,
    demand_id: Uuid,
    outcome: &'static str,
    detail: Option<String>,
) {
    if report.outcomes.len() < OUTCOME_DETAIL_LIMIT {
        report.outcomes.push(AccrualItemOutcome {
            demand_id,
            outcome,
            detail,
        });
    }
}

/// Audit context beyond the entity snapshots: which rule fired and the
/// overdue age and deltas it produced.
fn accrual_audit_metadata(
    financial_year: &str,
    rule_id: Uuid,
    change: &AccrualChange,
) -> serde_json::Value {
    json!({
        "rule_id": rule_id,
        "financial_year": financial_year,
        "overdue_days": change.overdue_days,
        "penalty_delta": change.penalty_delta,
        "interest_delta": change.interest_delta,
    })
}

async fn accrue_one(
    pool: &PgPool,
    tz: Tz,
    run_date: NaiveDate,
    demand_id: Uuid,
    rules_by_year: &mut HashMap<String, Option<PenaltyRule>>,
) -> AppResult<ItemOutcome> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::Dependency(format!("txn begin: {e}")))?;

    let demand = demands::get_for_update(&mut tx, demand_id).await?;

    let rule = match rules_by_year.get(&demand.financial_year) {
        Some(cached) => cached.clone(),
        None => {
            let resolved = penalty_rules::resolve_for(pool, &demand.financial_year, run_date).await?;
            rules_by_year.insert(demand.financial_year.clone(), resolved.clone());
            resolved
        }
    };
    let Some(rule) = rule else {
        return Ok(ItemOutcome::NoRule(demand.financial_year.clone()));
    };

    let change = match accrual::compute_accrual(&demand, &rule, run_date, tz) {
        Ok(change) => change,
        Err(reason) => return Ok(ItemOutcome::Skipped(reason)),
    };

    let applied_at = Utc::now();
    let entry = PenaltyBreakdownEntry {
        applied_at,
        rule_id: rule.id,
        overdue_days: change.overdue_days,
        penalty_delta: change.penalty_delta,
        interest_delta: change.interest_delta,
        penalty_after: change.penalty_amount,
        interest_after: change.interest_amount,
    };
    let entry_json = serde_json::to_value(&entry)
        .map_err(|e| AppError::Internal(format!("serialize breakdown entry: {e}")))?;

    demands::apply_accrual_tx(
        &mut tx,
        demand.id,
        change.penalty_amount,
        change.interest_amount,
        change.total_amount,
        change.balance_amount,
        change.status,
        change.overdue_days,
        applied_at,
        &entry_json,
    )
    .await?;

    tx.commit()
        .await
        .map_err(|e| AppError::Dependency(format!("txn commit: {e}")))?;

    let before = json!({
        "penalty_amount": demand.penalty_amount,
        "interest_amount": demand.interest_amount,
        "total_amount": demand.total_amount,
        "balance_amount": demand.balance_amount,
        "status": demand.status,
        "overdue_days": demand.overdue_days,
    });
    let after = json!({
        "penalty_amount": change.penalty_amount,
        "interest_amount": change.interest_amount,
        "total_amount": change.total_amount,
        "balance_amount": change.balance_amount,
        "status": change.status,
        "overdue_days": change.overdue_days,
    });
    let description = format!(
        "Accrual under rule {} ({}): penalty +{}, interest +{} at {} overdue days",
        rule.id, demand.financial_year, change.penalty_delta, change.interest_delta,
        change.overdue_days
    );
    let metadata = accrual_audit_metadata(&demand.financial_year, rule.id, &change);
    write_audit_log(
        Some(pool),
        None,
        "accrual_applied",
        "demands",
        Some(demand.id),
        Some(before),
        Some(after),
        Some(&description),
        Some(metadata),
    )
    .await;

    Ok(ItemOutcome::Applied(format!(
        "penalty +{}, interest +{}",
        change.penalty_delta, change.interest_delta
    )))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::DemandStatus;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn audit_metadata_names_the_rule_and_the_age() {
        let rule_id = Uuid::new_v4();
        let change = AccrualChange {
            overdue_days: 40,
            penalty_amount: dec("40.00"),
            interest_amount: dec("100.00"),
            penalty_delta: dec("40.00"),
            interest_delta: dec("100.00"),
            total_amount: dec("1140.00"),
            balance_amount: dec("1140.00"),
            status: DemandStatus::Overdue,
        };

        let metadata = accrual_audit_metadata("2025-26", rule_id, &change);
        assert_eq!(metadata["rule_id"], json!(rule_id));
        assert_eq!(metadata["financial_year"], json!("2025-26"));
        assert_eq!(metadata["overdue_days"], json!(40));
        assert_eq!(metadata["penalty_delta"], json!(dec("40.00")));
    }

    #[test]
    fn outcome_detail_is_capped_while_counters_keep_counting() {
        let mut report = AccrualRunReport {
            run_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            scanned: 0,
            applied: 0,
            skipped: 0,
            no_rule: 0,
            errors: 0,
            outcomes: Vec::new(),
        };
        for _ in 0..(OUTCOME_DETAIL_LIMIT + 5) {
            report.applied += 1;
            push_outcome(&mut report, Uuid::new_v4(), "applied", None);
        }
        assert_eq!(report.outcomes.len(), OUTCOME_DETAIL_LIMIT);
        assert_eq!(report.applied as usize, OUTCOME_DETAIL_LIMIT + 5);
    }
}
