#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a billed demand. Accrual flips pending → overdue; payment
/// capture moves rows toward partially_paid/paid; cancelled is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DemandStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Overdue,
    Cancelled,
}

impl DemandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PartiallyPaid => "partially_paid",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaxType {
    Property,
    Water,
    Shop,
}

impl TaxType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::Water => "water",
            Self::Shop => "shop",
        }
    }
}

/// One billed tax obligation for a property and financial year.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Demand {
    pub id: Uuid,
    pub demand_number: String,
    pub property_id: Uuid,
    pub financial_year: String,
    pub tax_type: TaxType,
    pub base_amount: Decimal,
    pub arrears_amount: Decimal,
    pub penalty_amount: Decimal,
    pub interest_amount: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub balance_amount: Decimal,
    pub due_date: NaiveDate,
    pub status: DemandStatus,
    pub overdue_days: i32,
    pub last_penalty_applied_at: Option<DateTime<Utc>>,
    /// Append-only history of accrual events (JSONB array).
    pub penalty_breakdown: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChargeKind {
    Flat,
    Percentage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChargeFrequency {
    OneTime,
    Monthly,
    Daily,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChargeBase {
    BaseAmount,
    TotalAmount,
    BalanceAmount,
}

/// Accrual configuration scoped to a financial year (or the "ALL"
/// wildcard). Historical rows are never edited; changes create new rows.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PenaltyRule {
    pub id: Uuid,
    pub financial_year: String,
    pub penalty_type: ChargeKind,
    pub penalty_value: Decimal,
    pub penalty_frequency: ChargeFrequency,
    pub penalty_base: ChargeBase,
    pub max_penalty_amount: Option<Decimal>,
    pub interest_type: ChargeKind,
    pub interest_value: Decimal,
    pub interest_frequency: ChargeFrequency,
    pub interest_base: ChargeBase,
    pub max_interest_amount: Option<Decimal>,
    pub grace_period_days: i32,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

pub const FINANCIAL_YEAR_ALL: &str = "ALL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    None,
    FirstReminder,
    SecondReminder,
    FinalWarning,
    EnforcementEligible,
}

impl EscalationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::FirstReminder => "first_reminder",
            Self::SecondReminder => "second_reminder",
            Self::FinalWarning => "final_warning",
            Self::EnforcementEligible => "enforcement_eligible",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Escalation ledger, exactly one row per demand. Mutated only by the
/// visit recorder and (lazily created) by the task synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FollowUp {
    pub id: Uuid,
    pub demand_id: Uuid,
    pub visit_count: i32,
    pub last_visit_date: Option<NaiveDate>,
    pub last_visit_id: Option<Uuid>,
    pub last_visit_type: Option<VisitType>,
    pub last_citizen_response: Option<CitizenResponse>,
    pub expected_payment_date: Option<NaiveDate>,
    pub escalation_level: i32,
    pub escalation_status: EscalationStatus,
    pub is_enforcement_eligible: bool,
    pub enforcement_eligible_date: Option<NaiveDate>,
    pub notice_triggered: bool,
    pub notice_id: Option<Uuid>,
    pub is_resolved: bool,
    pub resolved_date: Option<NaiveDate>,
    pub resolved_by: Option<Uuid>,
    pub priority: TaskPriority,
    pub next_follow_up_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VisitType {
    Reminder,
    PaymentCollection,
    Warning,
    FinalWarning,
}

impl VisitType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reminder => "reminder",
            Self::PaymentCollection => "payment_collection",
            Self::Warning => "warning",
            Self::FinalWarning => "final_warning",
        }
    }

    /// Escalation visits advance the follow-up level; payment collection
    /// never does.
    pub fn is_escalation(self) -> bool {
        !matches!(self, Self::PaymentCollection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CitizenResponse {
    WillPayToday,
    WillPayLater,
    RefusedToPay,
    NotAvailable,
}

impl CitizenResponse {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WillPayToday => "will_pay_today",
            Self::WillPayLater => "will_pay_later",
            Self::RefusedToPay => "refused_to_pay",
            Self::NotAvailable => "not_available",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Recorded,
    Flagged,
}

/// Append-only log of one collector interaction with one demand.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FieldVisit {
    pub id: Uuid,
    pub demand_id: Uuid,
    pub collector_id: Uuid,
    pub visit_year: i32,
    pub visit_number: i32,
    pub visit_sequence_number: i32,
    pub visit_type: VisitType,
    pub citizen_response: CitizenResponse,
    pub expected_payment_date: Option<NaiveDate>,
    pub amount_collected: Option<Decimal>,
    pub payment_id: Option<Uuid>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub device_id: Option<String>,
    pub attendance_session_id: Option<Uuid>,
    pub status: VisitStatus,
    pub window_note: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    PromisedPayment,
    OverdueFollowup,
    EnforcementVisit,
    EscalationVisit,
    DueToday,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PromisedPayment => "promised_payment",
            Self::OverdueFollowup => "overdue_followup",
            Self::EnforcementVisit => "enforcement_visit",
            Self::EscalationVisit => "escalation_visit",
            Self::DueToday => "due_today",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskOrigin {
    System,
    Admin,
}

/// One synthesized work item per (collector, demand, day).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CollectorTask {
    pub id: Uuid,
    pub collector_id: Uuid,
    pub demand_id: Uuid,
    pub task_date: NaiveDate,
    pub task_number: i32,
    pub task_type: TaskType,
    pub priority: TaskPriority,
    pub action_required: String,
    pub citizen_name: String,
    pub property_address: Option<String>,
    pub ward_id: String,
    pub tax_type: TaxType,
    pub amount_due: Decimal,
    pub status: TaskStatus,
    pub generated_by: TaskOrigin,
    pub is_auto_generated: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub completion_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Collaborator read model: property master data for denormalized task
/// snapshots and ward scoping.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PropertySummary {
    pub id: Uuid,
    pub property_number: String,
    pub owner_name: String,
    pub owner_phone: Option<String>,
    pub address: Option<String>,
    pub ward_id: String,
}

/// Collaborator read model: identity as forwarded by the auth gateway.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Employee {
    pub id: Uuid,
    pub full_name: String,
    pub role: String,
    pub is_active: bool,
}

/// Collaborator read model: a collector's logged-in window. `logout_at`
/// is NULL while the session is open.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AttendanceSession {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub login_at: DateTime<Utc>,
    pub logout_at: Option<DateTime<Utc>>,
}

/// Entry appended to `demands.penalty_breakdown` per accrual event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyBreakdownEntry {
    pub applied_at: DateTime<Utc>,
    pub rule_id: Uuid,
    pub overdue_days: i32,
    pub penalty_delta: Decimal,
    pub interest_delta: Decimal,
    pub penalty_after: Decimal,
    pub interest_after: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Status names are interpolated into client-facing messages and must
    // agree with the serialized form.
    #[test]
    fn task_status_text_matches_the_wire_names() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
        ] {
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire, serde_json::Value::String(status.as_str().to_string()));
        }
    }
}
