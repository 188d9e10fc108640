use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::models::{
    ChargeBase, ChargeFrequency, ChargeKind, CitizenResponse, TaskStatus, VisitType,
};

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

/// Money fields arrive as JSON strings or numbers; validator has no
/// Decimal support, so non-negativity is checked here.
pub fn ensure_non_negative(field: &str, value: Decimal) -> Result<(), AppError> {
    if value < Decimal::ZERO {
        return Err(AppError::UnprocessableEntity(format!(
            "Validation failed: {field} must not be negative"
        )));
    }
    Ok(())
}

fn default_limit_50() -> i64 {
    50
}
fn default_limit_100() -> i64 {
    100
}
fn default_limit_200() -> i64 {
    200
}
fn default_false() -> bool {
    false
}
fn default_payment_mode() -> String {
    "cash".to_string()
}
fn default_grace_period_days() -> i32 {
    0
}
fn default_charge_base_balance() -> ChargeBase {
    ChargeBase::BalanceAmount
}

pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, 500)
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct RecordVisitInput {
    pub demand_id: Uuid,
    pub visit_type: VisitType,
    pub citizen_response: CitizenResponse,
    pub expected_payment_date: Option<NaiveDate>,
    pub amount_collected: Option<Decimal>,
    #[serde(default = "default_payment_mode")]
    pub payment_mode: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[validate(length(max = 128))]
    pub device_id: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct VisitsQuery {
    #[serde(default = "default_limit_50")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TasksQuery {
    /// Defaults to today in the municipality timezone.
    pub date: Option<NaiveDate>,
    pub status: Option<TaskStatus>,
    /// Admins may inspect another collector's list.
    pub collector_id: Option<Uuid>,
    #[serde(default = "default_limit_200")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CompleteTaskInput {
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub struct RunAccrualInput {
    /// Civil date to accrue as of; defaults to today in the municipality
    /// timezone.
    pub as_of_date: Option<NaiveDate>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub struct RunTaskGenerationInput {
    pub task_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreatePenaltyRuleInput {
    #[validate(length(min = 1, max = 16))]
    pub financial_year: String,
    pub penalty_type: ChargeKind,
    pub penalty_value: Decimal,
    pub penalty_frequency: ChargeFrequency,
    #[serde(default = "default_charge_base_balance")]
    pub penalty_base: ChargeBase,
    pub max_penalty_amount: Option<Decimal>,
    pub interest_type: ChargeKind,
    pub interest_value: Decimal,
    pub interest_frequency: ChargeFrequency,
    #[serde(default = "default_charge_base_balance")]
    pub interest_base: ChargeBase,
    pub max_interest_amount: Option<Decimal>,
    #[serde(default = "default_grace_period_days")]
    pub grace_period_days: i32,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PenaltyRulesQuery {
    pub financial_year: Option<String>,
    #[serde(default = "default_false")]
    pub include_inactive: bool,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct DemandPath {
    pub demand_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TaskPath {
    pub task_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_limit_bounds_both_ends() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(-5), 1);
        assert_eq!(clamp_limit(250), 250);
        assert_eq!(clamp_limit(10_000), 500);
    }

    #[test]
    fn ensure_non_negative_rejects_negative_money() {
        assert!(ensure_non_negative("penalty_value", Decimal::new(100, 2)).is_ok());
        assert!(ensure_non_negative("penalty_value", Decimal::new(-1, 2)).is_err());
    }

    #[test]
    fn record_visit_input_parses_snake_case_enums() {
        let input: RecordVisitInput = serde_json::from_value(serde_json::json!({
            "demand_id": "7b4f9c2e-55aa-4f6e-9f2e-1db08a2f3c11",
            "visit_type": "payment_collection",
            "citizen_response": "will_pay_today",
            "amount_collected": "150.00"
        }))
        .unwrap();
        assert_eq!(input.visit_type, VisitType::PaymentCollection);
        assert_eq!(input.citizen_response, CitizenResponse::WillPayToday);
        assert_eq!(input.payment_mode, "cash");
        assert_eq!(input.amount_collected, Some(Decimal::new(15000, 2)));
    }
}
