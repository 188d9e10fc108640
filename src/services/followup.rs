use chrono::{Duration, NaiveDate};

use crate::error::AppError;
use crate::models::{CitizenResponse, EscalationStatus, TaskPriority, VisitType};

/// Escalation visit type demanded next by the 1/2/3/4+ sequence, given
/// the level already reached.
pub fn expected_visit_type(escalation_level: i32) -> VisitType {
    match escalation_level {
        0 | 1 => VisitType::Reminder,
        2 => VisitType::Warning,
        _ => VisitType::FinalWarning,
    }
}

pub fn escalation_status_for_level(level: i32) -> EscalationStatus {
    match level {
        i32::MIN..=0 => EscalationStatus::None,
        1 => EscalationStatus::FirstReminder,
        2 => EscalationStatus::SecondReminder,
        3 => EscalationStatus::FinalWarning,
        _ => EscalationStatus::EnforcementEligible,
    }
}

/// Rejection for an out-of-order escalation visit. Sequence skips are an
/// input error, never silently reordered.
pub fn sequence_error(escalation_level: i32, received: VisitType) -> AppError {
    let expected = expected_visit_type(escalation_level);
    AppError::UnprocessableEntity(format!(
        "Invalid escalation sequence: visit {} must be '{}', got '{}'.",
        escalation_level + 1,
        expected.as_str(),
        received.as_str()
    ))
}

/// Urgency from total visits and overdue age; escalation level plays no
/// part here.
pub fn priority_for(visit_count: i32, overdue_days: i32) -> TaskPriority {
    if visit_count >= 3 || overdue_days > 60 {
        TaskPriority::Critical
    } else if visit_count >= 2 || overdue_days > 30 {
        TaskPriority::High
    } else if overdue_days > 15 {
        TaskPriority::Medium
    } else {
        TaskPriority::Low
    }
}

/// Next follow-up date derived from the citizen's response. Promised
/// dates get a 2-day buffer; a same-day promise needs no revisit date.
pub fn next_follow_up_date(
    response: CitizenResponse,
    visit_date: NaiveDate,
    promised_date: Option<NaiveDate>,
) -> Option<NaiveDate> {
    match response {
        CitizenResponse::WillPayToday => None,
        CitizenResponse::WillPayLater => promised_date.map(|date| date + Duration::days(2)),
        CitizenResponse::NotAvailable => Some(visit_date + Duration::days(3)),
        CitizenResponse::RefusedToPay => Some(visit_date + Duration::days(7)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn sequence_expects_reminder_reminder_warning_then_final() {
        assert_eq!(expected_visit_type(0), VisitType::Reminder);
        assert_eq!(expected_visit_type(1), VisitType::Reminder);
        assert_eq!(expected_visit_type(2), VisitType::Warning);
        assert_eq!(expected_visit_type(3), VisitType::FinalWarning);
        assert_eq!(expected_visit_type(4), VisitType::FinalWarning);
    }

    #[test]
    fn level_maps_positionally_to_status() {
        assert_eq!(escalation_status_for_level(0), EscalationStatus::None);
        assert_eq!(
            escalation_status_for_level(1),
            EscalationStatus::FirstReminder
        );
        assert_eq!(
            escalation_status_for_level(2),
            EscalationStatus::SecondReminder
        );
        assert_eq!(
            escalation_status_for_level(3),
            EscalationStatus::FinalWarning
        );
        assert_eq!(
            escalation_status_for_level(4),
            EscalationStatus::EnforcementEligible
        );
    }

    #[test]
    fn three_escalation_visits_reach_final_warning() {
        // reminder, reminder, warning
        let mut level = 0;
        for visit in [VisitType::Reminder, VisitType::Reminder, VisitType::Warning] {
            assert_eq!(expected_visit_type(level), visit);
            level = (level + 1).min(4);
        }
        assert_eq!(level, 3);
        assert_eq!(
            escalation_status_for_level(level),
            EscalationStatus::FinalWarning
        );
    }

    #[test]
    fn out_of_order_warning_is_named_in_the_error() {
        let error = sequence_error(1, VisitType::Warning);
        let message = error.to_string();
        assert!(message.contains("visit 2"));
        assert!(message.contains("'reminder'"));
        assert!(message.contains("'warning'"));
    }

    #[test]
    fn priority_thresholds() {
        assert_eq!(priority_for(0, 0), TaskPriority::Low);
        assert_eq!(priority_for(0, 15), TaskPriority::Low);
        assert_eq!(priority_for(0, 16), TaskPriority::Medium);
        assert_eq!(priority_for(0, 31), TaskPriority::High);
        assert_eq!(priority_for(2, 0), TaskPriority::High);
        assert_eq!(priority_for(0, 61), TaskPriority::Critical);
        assert_eq!(priority_for(3, 0), TaskPriority::Critical);
    }

    #[test]
    fn follow_up_dates_by_response() {
        let visit_date = date(2026, 3, 10);
        assert_eq!(
            next_follow_up_date(CitizenResponse::WillPayToday, visit_date, None),
            None
        );
        assert_eq!(
            next_follow_up_date(
                CitizenResponse::WillPayLater,
                visit_date,
                Some(date(2026, 3, 15))
            ),
            Some(date(2026, 3, 17))
        );
        assert_eq!(
            next_follow_up_date(CitizenResponse::NotAvailable, visit_date, None),
            Some(date(2026, 3, 13))
        );
        assert_eq!(
            next_follow_up_date(CitizenResponse::RefusedToPay, visit_date, None),
            Some(date(2026, 3, 17))
        );
    }
}
