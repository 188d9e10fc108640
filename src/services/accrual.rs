use chrono::{Datelike, NaiveDate};
use chrono_tz::Tz;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{ChargeBase, ChargeFrequency, ChargeKind, Demand, DemandStatus, PenaltyRule};

/// 2-decimal currency rounding used at every computation point.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Whole days past the due date on `on_date`, before grace.
pub fn raw_overdue_days(due_date: NaiveDate, on_date: NaiveDate) -> i32 {
    (on_date - due_date).num_days().clamp(0, i64::from(i32::MAX)) as i32
}

/// Overdue days net of the rule's grace period, floored at zero.
pub fn effective_overdue_days(
    due_date: NaiveDate,
    grace_period_days: i32,
    on_date: NaiveDate,
) -> i32 {
    (raw_overdue_days(due_date, on_date) - grace_period_days.max(0)).max(0)
}

fn period_multiplier(frequency: ChargeFrequency, overdue_days: i32) -> Decimal {
    match frequency {
        ChargeFrequency::OneTime => Decimal::ONE,
        // ceil(days / 30): a started month counts in full
        ChargeFrequency::Monthly => Decimal::from((i64::from(overdue_days) + 29) / 30),
        ChargeFrequency::Daily => Decimal::from(overdue_days),
    }
}

fn charge_base(demand: &Demand, base: ChargeBase) -> Decimal {
    match base {
        ChargeBase::BaseAmount => demand.base_amount,
        ChargeBase::TotalAmount => demand.total_amount,
        ChargeBase::BalanceAmount => demand.balance_amount,
    }
}

fn charge(
    kind: ChargeKind,
    value: Decimal,
    base: Decimal,
    frequency: ChargeFrequency,
    overdue_days: i32,
    cap: Option<Decimal>,
) -> Decimal {
    if overdue_days <= 0 || base <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let multiplier = period_multiplier(frequency, overdue_days);
    let amount = match kind {
        ChargeKind::Flat => value * multiplier,
        ChargeKind::Percentage => base * value / Decimal::ONE_HUNDRED * multiplier,
    };
    let amount = match cap {
        Some(cap) if cap >= Decimal::ZERO => amount.min(cap),
        _ => amount,
    };
    round_money(amount.max(Decimal::ZERO))
}

/// Total penalty owed for the full overdue period, not an increment.
pub fn penalty_for(demand: &Demand, rule: &PenaltyRule, overdue_days: i32) -> Decimal {
    charge(
        rule.penalty_type,
        rule.penalty_value,
        charge_base(demand, rule.penalty_base),
        rule.penalty_frequency,
        overdue_days,
        rule.max_penalty_amount,
    )
}

pub fn interest_for(demand: &Demand, rule: &PenaltyRule, overdue_days: i32) -> Decimal {
    charge(
        rule.interest_type,
        rule.interest_value,
        charge_base(demand, rule.interest_base),
        rule.interest_frequency,
        overdue_days,
        rule.max_interest_amount,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotOverdue,
    DemandClosed,
    NothingOwed,
    AlreadyApplied,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotOverdue => "not_overdue",
            Self::DemandClosed => "demand_closed",
            Self::NothingOwed => "nothing_owed",
            Self::AlreadyApplied => "already_applied",
        }
    }
}

/// Idempotency guard. The accrual window follows the rule's penalty
/// frequency: daily rules re-apply on a new civil day, monthly rules on
/// a new civil month, one_time rules only while no penalty is posted.
/// Civil comparisons use the municipality timezone.
pub fn skip_reason(
    demand: &Demand,
    rule: &PenaltyRule,
    overdue_days: i32,
    on_date: NaiveDate,
    tz: Tz,
) -> Option<SkipReason> {
    if matches!(demand.status, DemandStatus::Paid | DemandStatus::Cancelled) {
        return Some(SkipReason::DemandClosed);
    }
    if demand.balance_amount <= Decimal::ZERO {
        return Some(SkipReason::NothingOwed);
    }
    if overdue_days <= 0 {
        return Some(SkipReason::NotOverdue);
    }

    match rule.penalty_frequency {
        ChargeFrequency::OneTime => {
            if demand.penalty_amount > Decimal::ZERO {
                return Some(SkipReason::AlreadyApplied);
            }
        }
        ChargeFrequency::Daily => {
            if let Some(last) = demand.last_penalty_applied_at {
                if last.with_timezone(&tz).date_naive() == on_date {
                    return Some(SkipReason::AlreadyApplied);
                }
            }
        }
        ChargeFrequency::Monthly => {
            if let Some(last) = demand.last_penalty_applied_at {
                let local = last.with_timezone(&tz).date_naive();
                if local.year() == on_date.year() && local.month() == on_date.month() {
                    return Some(SkipReason::AlreadyApplied);
                }
            }
        }
    }
    None
}

/// Recomputed amounts for one accrual application.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccrualChange {
    pub overdue_days: i32,
    pub penalty_amount: Decimal,
    pub interest_amount: Decimal,
    pub penalty_delta: Decimal,
    pub interest_delta: Decimal,
    pub total_amount: Decimal,
    pub balance_amount: Decimal,
    pub status: DemandStatus,
}

/// From-scratch recompute of a demand's charges as of `on_date`.
/// Posted charges never decrease: recomputed values are floored at the
/// stored ones, so a shrinking balance base cannot claw back a penalty.
pub fn compute_accrual(
    demand: &Demand,
    rule: &PenaltyRule,
    on_date: NaiveDate,
    tz: Tz,
) -> Result<AccrualChange, SkipReason> {
    let overdue_days = effective_overdue_days(demand.due_date, rule.grace_period_days, on_date);
    if let Some(reason) = skip_reason(demand, rule, overdue_days, on_date, tz) {
        return Err(reason);
    }

    let penalty_amount = penalty_for(demand, rule, overdue_days).max(demand.penalty_amount);
    let interest_amount = interest_for(demand, rule, overdue_days).max(demand.interest_amount);
    let total_amount = round_money(
        demand.base_amount + demand.arrears_amount + penalty_amount + interest_amount,
    );
    let balance_amount = round_money(total_amount - demand.paid_amount);
    let status = if demand.status == DemandStatus::Pending {
        DemandStatus::Overdue
    } else {
        demand.status
    };

    Ok(AccrualChange {
        overdue_days,
        penalty_delta: penalty_amount - demand.penalty_amount,
        interest_delta: interest_amount - demand.interest_amount,
        penalty_amount,
        interest_amount,
        total_amount,
        balance_amount,
        status,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use chrono_tz::Tz;
    use rust_decimal::Decimal;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::models::TaxType;

    const TZ: Tz = chrono_tz::Asia::Kolkata;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    fn demand_overdue(base: &str, due_date: NaiveDate) -> Demand {
        let base = dec(base);
        Demand {
            id: Uuid::new_v4(),
            demand_number: "PT/2025-26/000123".to_string(),
            property_id: Uuid::new_v4(),
            financial_year: "2025-26".to_string(),
            tax_type: TaxType::Property,
            base_amount: base,
            arrears_amount: Decimal::ZERO,
            penalty_amount: Decimal::ZERO,
            interest_amount: Decimal::ZERO,
            total_amount: base,
            paid_amount: Decimal::ZERO,
            balance_amount: base,
            due_date,
            status: DemandStatus::Pending,
            overdue_days: 0,
            last_penalty_applied_at: None,
            penalty_breakdown: Some(json!([])),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn monthly_percentage_rule() -> PenaltyRule {
        PenaltyRule {
            id: Uuid::new_v4(),
            financial_year: "2025-26".to_string(),
            penalty_type: ChargeKind::Percentage,
            penalty_value: dec("2"),
            penalty_frequency: ChargeFrequency::Monthly,
            penalty_base: ChargeBase::BaseAmount,
            max_penalty_amount: None,
            interest_type: ChargeKind::Percentage,
            interest_value: dec("5"),
            interest_frequency: ChargeFrequency::Monthly,
            interest_base: ChargeBase::BalanceAmount,
            max_interest_amount: None,
            grace_period_days: 0,
            effective_from: date(2025, 4, 1),
            effective_to: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn overdue_days_floor_at_zero_and_apply_grace() {
        let due = date(2026, 3, 1);
        assert_eq!(raw_overdue_days(due, date(2026, 2, 20)), 0);
        assert_eq!(raw_overdue_days(due, date(2026, 3, 1)), 0);
        assert_eq!(raw_overdue_days(due, date(2026, 3, 11)), 10);
        assert_eq!(effective_overdue_days(due, 15, date(2026, 3, 11)), 0);
        assert_eq!(effective_overdue_days(due, 3, date(2026, 3, 11)), 7);
    }

    #[test]
    fn monthly_multiplier_counts_started_months() {
        assert_eq!(period_multiplier(ChargeFrequency::Monthly, 1), dec("1"));
        assert_eq!(period_multiplier(ChargeFrequency::Monthly, 30), dec("1"));
        assert_eq!(period_multiplier(ChargeFrequency::Monthly, 31), dec("2"));
        assert_eq!(period_multiplier(ChargeFrequency::Monthly, 40), dec("2"));
        assert_eq!(period_multiplier(ChargeFrequency::Monthly, 61), dec("3"));
        assert_eq!(period_multiplier(ChargeFrequency::OneTime, 400), dec("1"));
        assert_eq!(period_multiplier(ChargeFrequency::Daily, 12), dec("12"));
    }

    #[test]
    fn forty_days_on_monthly_percentage_rule() {
        // 1000 base, due 40 days back, 2% monthly penalty on base,
        // 5% monthly interest on balance: 2 months started.
        let on_date = date(2026, 2, 10);
        let demand = demand_overdue("1000", date(2026, 1, 1));
        let rule = monthly_percentage_rule();

        let change = compute_accrual(&demand, &rule, on_date, TZ).unwrap();
        assert_eq!(change.overdue_days, 40);
        assert_eq!(change.penalty_amount, dec("40.00"));
        assert_eq!(change.interest_amount, dec("100.00"));
        assert_eq!(change.total_amount, dec("1140.00"));
        assert_eq!(change.balance_amount, dec("1140.00"));
        assert_eq!(change.status, DemandStatus::Overdue);
    }

    #[test]
    fn flat_daily_charge_multiplies_by_days() {
        let mut rule = monthly_percentage_rule();
        rule.penalty_type = ChargeKind::Flat;
        rule.penalty_value = dec("2.50");
        rule.penalty_frequency = ChargeFrequency::Daily;

        let demand = demand_overdue("1000", date(2026, 1, 1));
        assert_eq!(penalty_for(&demand, &rule, 10), dec("25.00"));
    }

    #[test]
    fn caps_bound_the_charge() {
        let mut rule = monthly_percentage_rule();
        rule.max_penalty_amount = Some(dec("25"));
        rule.max_interest_amount = Some(dec("30"));

        let demand = demand_overdue("1000", date(2026, 1, 1));
        assert_eq!(penalty_for(&demand, &rule, 40), dec("25.00"));
        assert_eq!(interest_for(&demand, &rule, 40), dec("30.00"));
    }

    #[test]
    fn rounds_midpoint_away_from_zero() {
        assert_eq!(round_money(dec("1.005")), dec("1.01"));
        assert_eq!(round_money(dec("1.004")), dec("1.00"));
        assert_eq!(round_money(dec("3.3333")), dec("3.33"));
    }

    #[test]
    fn zero_base_yields_zero_charge() {
        let mut demand = demand_overdue("1000", date(2026, 1, 1));
        demand.base_amount = Decimal::ZERO;
        let rule = monthly_percentage_rule();
        assert_eq!(penalty_for(&demand, &rule, 40), dec("0"));
    }

    #[test]
    fn daily_window_compares_civil_days_in_local_time() {
        let mut rule = monthly_percentage_rule();
        rule.penalty_frequency = ChargeFrequency::Daily;
        let on_date = date(2026, 3, 10);
        let mut demand = demand_overdue("1000", date(2026, 1, 1));

        // 20:00 UTC on Mar 9 is already Mar 10 in Kolkata
        demand.last_penalty_applied_at =
            Some(Utc.with_ymd_and_hms(2026, 3, 9, 20, 0, 0).unwrap());
        assert_eq!(
            skip_reason(&demand, &rule, 40, on_date, TZ),
            Some(SkipReason::AlreadyApplied)
        );

        demand.last_penalty_applied_at =
            Some(Utc.with_ymd_and_hms(2026, 3, 9, 10, 0, 0).unwrap());
        assert_eq!(skip_reason(&demand, &rule, 40, on_date, TZ), None);
    }

    #[test]
    fn monthly_window_blocks_same_civil_month() {
        let rule = monthly_percentage_rule();
        let mut demand = demand_overdue("1000", date(2026, 1, 1));

        demand.last_penalty_applied_at =
            Some(Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap());
        assert_eq!(
            skip_reason(&demand, &rule, 40, date(2026, 3, 20), TZ),
            Some(SkipReason::AlreadyApplied)
        );
        assert_eq!(skip_reason(&demand, &rule, 40, date(2026, 4, 2), TZ), None);
    }

    #[test]
    fn one_time_window_blocks_once_penalty_posted() {
        let mut rule = monthly_percentage_rule();
        rule.penalty_frequency = ChargeFrequency::OneTime;
        let mut demand = demand_overdue("1000", date(2026, 1, 1));

        assert_eq!(skip_reason(&demand, &rule, 40, date(2026, 2, 10), TZ), None);
        demand.penalty_amount = dec("20");
        assert_eq!(
            skip_reason(&demand, &rule, 40, date(2026, 2, 10), TZ),
            Some(SkipReason::AlreadyApplied)
        );
    }

    #[test]
    fn closed_or_settled_demands_never_accrue() {
        let rule = monthly_percentage_rule();
        let mut demand = demand_overdue("1000", date(2026, 1, 1));
        demand.status = DemandStatus::Paid;
        assert_eq!(
            skip_reason(&demand, &rule, 40, date(2026, 2, 10), TZ),
            Some(SkipReason::DemandClosed)
        );

        let mut demand = demand_overdue("1000", date(2026, 1, 1));
        demand.balance_amount = Decimal::ZERO;
        assert_eq!(
            skip_reason(&demand, &rule, 40, date(2026, 2, 10), TZ),
            Some(SkipReason::NothingOwed)
        );
    }

    #[test]
    fn posted_charges_never_decrease() {
        // Balance-based penalty after a partial payment recomputes lower;
        // the stored amount must win.
        let mut rule = monthly_percentage_rule();
        rule.penalty_base = ChargeBase::BalanceAmount;
        let mut demand = demand_overdue("1000", date(2026, 1, 1));
        demand.penalty_amount = dec("80.00");
        demand.interest_amount = dec("100.00");
        demand.total_amount = dec("1180.00");
        demand.paid_amount = dec("900.00");
        demand.balance_amount = dec("280.00");
        demand.status = DemandStatus::PartiallyPaid;

        let change = compute_accrual(&demand, &rule, date(2026, 3, 10), TZ).unwrap();
        assert!(change.penalty_amount >= dec("80.00"));
        assert!(change.interest_amount >= dec("100.00"));
        assert!(change.penalty_delta >= Decimal::ZERO);
        assert!(change.interest_delta >= Decimal::ZERO);
    }

    #[test]
    fn recompute_is_idempotent_within_a_day() {
        // Same civil day, daily rule: second run must be skipped, so the
        // amounts a second run would write are identical by construction.
        let mut rule = monthly_percentage_rule();
        rule.penalty_frequency = ChargeFrequency::Daily;
        rule.penalty_type = ChargeKind::Flat;
        rule.penalty_value = dec("1");

        let on_date = date(2026, 2, 10);
        let mut demand = demand_overdue("1000", date(2026, 1, 1));
        let first = compute_accrual(&demand, &rule, on_date, TZ).unwrap();

        demand.penalty_amount = first.penalty_amount;
        demand.interest_amount = first.interest_amount;
        demand.total_amount = first.total_amount;
        demand.balance_amount = first.balance_amount;
        demand.status = first.status;
        demand.last_penalty_applied_at =
            Some(TZ.with_ymd_and_hms(2026, 2, 10, 11, 0, 0).unwrap().with_timezone(&Utc));

        assert_eq!(
            compute_accrual(&demand, &rule, on_date, TZ).unwrap_err(),
            SkipReason::AlreadyApplied
        );
    }

    #[test]
    fn partially_paid_is_not_flipped_to_overdue() {
        let rule = monthly_percentage_rule();
        let mut demand = demand_overdue("1000", date(2026, 1, 1));
        demand.paid_amount = dec("400");
        demand.balance_amount = dec("600");
        demand.status = DemandStatus::PartiallyPaid;

        let change = compute_accrual(&demand, &rule, date(2026, 2, 10), TZ).unwrap();
        assert_eq!(change.status, DemandStatus::PartiallyPaid);
    }
}
