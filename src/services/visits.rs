use chrono::{Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    CitizenResponse, Demand, DemandStatus, Employee, FieldVisit, FollowUp, VisitStatus, VisitType,
};
use crate::repository::{
    demands,
    field_visits::{self, NewFieldVisit},
    follow_ups,
};
use crate::schemas::RecordVisitInput;
use crate::services::accrual::{raw_overdue_days, round_money};
use crate::services::audit::write_audit_log;
use crate::services::followup;

#[derive(Debug, Clone, serde::Serialize)]
pub struct RecordedVisit {
    pub visit: FieldVisit,
    pub follow_up: FollowUp,
    pub payment_id: Option<Uuid>,
}

/// Records one collector visit: sequence check, attendance flagging,
/// optional payment capture, follow-up recompute, and the one-time
/// enforcement notice, all in a single transaction. The follow-up row
/// lock serializes concurrent submissions for the same demand.
pub async fn record_visit(
    pool: &PgPool,
    tz: Tz,
    collector: &Employee,
    input: &RecordVisitInput,
) -> AppResult<RecordedVisit> {
    validate_payload(input)?;

    let now = Utc::now();
    let visit_date = now.with_timezone(&tz).date_naive();
    let visit_year = visit_date.year();

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::Dependency(format!("txn begin: {e}")))?;

    let demand = demands::get_for_update(&mut tx, input.demand_id).await?;
    ensure_demand_open(&demand)?;

    let follow_up = follow_ups::get_or_create_for_update(&mut tx, demand.id).await?;
    if follow_up.is_resolved {
        return Err(AppError::Conflict(
            "Follow-up for this demand is already resolved.".to_string(),
        ));
    }

    if input.visit_type.is_escalation()
        && input.visit_type != followup::expected_visit_type(follow_up.escalation_level)
    {
        return Err(followup::sequence_error(
            follow_up.escalation_level,
            input.visit_type,
        ));
    }

    // Attendance is informational: a visit outside an open session is
    // flagged, never rejected.
    let session = field_visits::find_open_session_tx(&mut tx, collector.id, now).await?;
    let (status, window_note, attendance_session_id) = match session {
        Some(session) => (VisitStatus::Recorded, None, Some(session.id)),
        None => (
            VisitStatus::Flagged,
            Some("Visit recorded outside an open attendance session.".to_string()),
            None,
        ),
    };

    let mut payment_id = None;
    let mut amount_collected = None;
    let mut balance_after = demand.balance_amount;
    if input.visit_type == VisitType::PaymentCollection
        && input.citizen_response == CitizenResponse::WillPayToday
    {
        let amount = round_money(input.amount_collected.unwrap_or_default());
        if amount > demand.balance_amount {
            return Err(AppError::UnprocessableEntity(format!(
                "Collected amount {amount} exceeds the outstanding balance {}.",
                demand.balance_amount
            )));
        }

        let id = Uuid::new_v4();
        let receipt = receipt_number(visit_date, id);
        field_visits::insert_payment_tx(
            &mut tx,
            id,
            demand.id,
            amount,
            &input.payment_mode,
            visit_date,
            &receipt,
            collector.id,
        )
        .await?;

        let (paid_after, new_balance, status_after) =
            payment_result(demand.total_amount, demand.paid_amount, amount);
        demands::apply_payment_tx(&mut tx, demand.id, paid_after, new_balance, status_after)
            .await?;

        balance_after = new_balance;
        payment_id = Some(id);
        amount_collected = Some(amount);
    }

    let new_visit = NewFieldVisit {
        id: Uuid::new_v4(),
        demand_id: demand.id,
        collector_id: collector.id,
        visit_year,
        visit_type: input.visit_type,
        citizen_response: input.citizen_response,
        expected_payment_date: input.expected_payment_date,
        amount_collected,
        payment_id,
        latitude: input.latitude,
        longitude: input.longitude,
        device_id: input.device_id.clone(),
        attendance_session_id,
        status,
        window_note,
        notes: input.notes.clone(),
    };
    let visit = field_visits::insert_tx(&mut tx, &new_visit).await?;

    let mut updated = follow_up.clone();
    updated.visit_count += 1;
    updated.last_visit_date = Some(visit_date);
    updated.last_visit_id = Some(visit.id);
    updated.last_visit_type = Some(input.visit_type);
    updated.last_citizen_response = Some(input.citizen_response);

    if input.visit_type.is_escalation() {
        let new_level = (follow_up.escalation_level + 1).min(4);
        updated.escalation_level = new_level;
        updated.escalation_status = followup::escalation_status_for_level(new_level);
        if new_level == 4 && !follow_up.is_enforcement_eligible {
            updated.is_enforcement_eligible = true;
            updated.enforcement_eligible_date = Some(visit_date);
        }
    }

    updated.priority =
        followup::priority_for(updated.visit_count, raw_overdue_days(demand.due_date, visit_date));
    updated.next_follow_up_date =
        followup::next_follow_up_date(input.citizen_response, visit_date, input.expected_payment_date);
    updated.expected_payment_date = match input.citizen_response {
        CitizenResponse::WillPayLater => input.expected_payment_date,
        CitizenResponse::WillPayToday => Some(visit_date),
        // A refusal voids any earlier promise; absence leaves it intact.
        CitizenResponse::RefusedToPay => None,
        CitizenResponse::NotAvailable => follow_up.expected_payment_date,
    };

    if updated.escalation_level >= 3 && !updated.notice_triggered && balance_after > Decimal::ZERO
    {
        let notice_id = Uuid::new_v4();
        follow_ups::insert_notice_tx(
            &mut tx,
            notice_id,
            demand.id,
            updated.id,
            balance_after,
            collector.id,
        )
        .await?;
        updated.notice_triggered = true;
        updated.notice_id = Some(notice_id);
    }

    if payment_id.is_some() && balance_after <= Decimal::ZERO {
        updated.is_resolved = true;
        updated.resolved_date = Some(visit_date);
        updated.resolved_by = Some(collector.id);
        updated.next_follow_up_date = None;
    }

    follow_ups::persist_visit_outcome_tx(&mut tx, &updated).await?;

    tx.commit()
        .await
        .map_err(|e| AppError::Dependency(format!("txn commit: {e}")))?;

    let after = json!({
        "visit_number": visit.visit_number,
        "visit_sequence_number": visit.visit_sequence_number,
        "visit_type": visit.visit_type,
        "citizen_response": visit.citizen_response,
        "status": visit.status,
        "escalation_level": updated.escalation_level,
        "escalation_status": updated.escalation_status,
        "amount_collected": amount_collected,
        "balance_after": balance_after,
    });
    write_audit_log(
        Some(pool),
        Some(collector.id),
        "visit_recorded",
        "field_visits",
        Some(visit.id),
        None,
        Some(after),
        Some(&format!(
            "Visit {} on demand {}: {} / {}",
            visit.visit_sequence_number,
            demand.demand_number,
            visit.visit_type.as_str(),
            visit.citizen_response.as_str()
        )),
        Some(json!({
            "demand_id": demand.id,
            "attendance_session_id": attendance_session_id,
        })),
    )
    .await;

    if let Some(payment_id) = payment_id {
        write_audit_log(
            Some(pool),
            Some(collector.id),
            "payment_captured",
            "payments",
            Some(payment_id),
            Some(json!({ "balance_amount": demand.balance_amount })),
            Some(json!({ "balance_amount": balance_after })),
            Some(&format!(
                "Field payment on demand {} during visit {}",
                demand.demand_number, visit.visit_sequence_number
            )),
            Some(json!({
                "demand_id": demand.id,
                "visit_id": visit.id,
                "amount_collected": amount_collected,
            })),
        )
        .await;
    }

    Ok(RecordedVisit {
        visit,
        follow_up: updated,
        payment_id,
    })
}

fn ensure_demand_open(demand: &Demand) -> AppResult<()> {
    match demand.status {
        DemandStatus::Paid => Err(AppError::Conflict(
            "Demand is already fully paid.".to_string(),
        )),
        DemandStatus::Cancelled => Err(AppError::Conflict("Demand is cancelled.".to_string())),
        _ if demand.balance_amount <= Decimal::ZERO => Err(AppError::Conflict(
            "Demand has no outstanding balance.".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Cross-field checks that need no database state.
fn validate_payload(input: &RecordVisitInput) -> AppResult<()> {
    if input.citizen_response == CitizenResponse::WillPayLater
        && input.expected_payment_date.is_none()
    {
        return Err(AppError::UnprocessableEntity(
            "expected_payment_date is required when the citizen promises to pay later."
                .to_string(),
        ));
    }

    let is_payment_today = input.visit_type == VisitType::PaymentCollection
        && input.citizen_response == CitizenResponse::WillPayToday;
    if is_payment_today {
        match input.amount_collected {
            None => {
                return Err(AppError::UnprocessableEntity(
                    "amount_collected is required for a payment_collection visit with \
                     response 'will_pay_today'."
                        .to_string(),
                ))
            }
            Some(amount) if amount <= Decimal::ZERO => {
                return Err(AppError::UnprocessableEntity(
                    "amount_collected must be greater than zero.".to_string(),
                ))
            }
            _ => {}
        }
    } else if input.amount_collected.is_some() {
        return Err(AppError::UnprocessableEntity(
            "amount_collected is only accepted on a payment_collection visit with \
             response 'will_pay_today'."
                .to_string(),
        ));
    }

    Ok(())
}

fn payment_result(
    total_amount: Decimal,
    paid_amount: Decimal,
    amount: Decimal,
) -> (Decimal, Decimal, DemandStatus) {
    let paid_after = round_money(paid_amount + amount);
    let balance_after = round_money(total_amount - paid_after);
    let status = if balance_after <= Decimal::ZERO {
        DemandStatus::Paid
    } else {
        DemandStatus::PartiallyPaid
    };
    (paid_after, balance_after, status)
}

fn receipt_number(on_date: NaiveDate, payment_id: Uuid) -> String {
    let frag = payment_id.simple().to_string();
    format!(
        "RCPT-{}-{}",
        on_date.format("%Y%m%d"),
        frag[..8].to_ascii_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    fn visit_input(visit_type: VisitType, response: CitizenResponse) -> RecordVisitInput {
        RecordVisitInput {
            demand_id: Uuid::new_v4(),
            visit_type,
            citizen_response: response,
            expected_payment_date: None,
            amount_collected: None,
            payment_mode: "cash".to_string(),
            latitude: None,
            longitude: None,
            device_id: None,
            notes: None,
        }
    }

    #[test]
    fn promise_to_pay_later_needs_a_date() {
        let input = visit_input(VisitType::Reminder, CitizenResponse::WillPayLater);
        let error = validate_payload(&input).unwrap_err();
        assert!(error.to_string().contains("expected_payment_date"));

        let mut input = visit_input(VisitType::Reminder, CitizenResponse::WillPayLater);
        input.expected_payment_date = NaiveDate::from_ymd_opt(2026, 3, 15);
        assert!(validate_payload(&input).is_ok());
    }

    #[test]
    fn payment_visit_requires_positive_amount() {
        let mut input = visit_input(
            VisitType::PaymentCollection,
            CitizenResponse::WillPayToday,
        );
        assert!(validate_payload(&input).is_err());

        input.amount_collected = Some(dec("0"));
        assert!(validate_payload(&input).is_err());

        input.amount_collected = Some(dec("250.00"));
        assert!(validate_payload(&input).is_ok());
    }

    #[test]
    fn amount_is_rejected_outside_the_payment_path() {
        let mut input = visit_input(VisitType::Reminder, CitizenResponse::NotAvailable);
        input.amount_collected = Some(dec("100"));
        let error = validate_payload(&input).unwrap_err();
        assert!(error.to_string().contains("only accepted"));

        let mut input = visit_input(
            VisitType::PaymentCollection,
            CitizenResponse::WillPayLater,
        );
        input.expected_payment_date = NaiveDate::from_ymd_opt(2026, 3, 15);
        input.amount_collected = Some(dec("100"));
        assert!(validate_payload(&input).is_err());
    }

    #[test]
    fn exact_payment_settles_the_demand() {
        let (paid, balance, status) = payment_result(dec("1140.00"), dec("140.00"), dec("1000.00"));
        assert_eq!(paid, dec("1140.00"));
        assert_eq!(balance, dec("0.00"));
        assert_eq!(status, DemandStatus::Paid);
    }

    #[test]
    fn partial_payment_keeps_the_demand_open() {
        let (paid, balance, status) = payment_result(dec("1140.00"), dec("0"), dec("500.00"));
        assert_eq!(paid, dec("500.00"));
        assert_eq!(balance, dec("640.00"));
        assert_eq!(status, DemandStatus::PartiallyPaid);
    }

    #[test]
    fn receipt_numbers_carry_the_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let receipt = receipt_number(date, Uuid::nil());
        assert!(receipt.starts_with("RCPT-20260310-"));
        assert_eq!(receipt.len(), "RCPT-20260310-".len() + 8);
    }
}
