use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::map_db_error;
use crate::error::AppResult;
use crate::models::{AttendanceSession, CitizenResponse, FieldVisit, VisitStatus, VisitType};
use crate::schemas::clamp_limit;

const FIELD_VISIT_COLUMNS: &str = "id, demand_id, collector_id, visit_year, visit_number, \
     visit_sequence_number, visit_type, citizen_response, expected_payment_date, \
     amount_collected, payment_id, latitude, longitude, device_id, attendance_session_id, \
     status, window_note, notes, created_at";

/// Insert payload assembled by the visit recorder. The yearly register
/// number and the per-demand ordinal are filled in by the database while
/// the follow-up row lock is held.
#[derive(Debug, Clone)]
pub struct NewFieldVisit {
    pub id: Uuid,
    pub demand_id: Uuid,
    pub collector_id: Uuid,
    pub visit_year: i32,
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
}

pub async fn insert_tx(conn: &mut PgConnection, visit: &NewFieldVisit) -> AppResult<FieldVisit> {
    let query = format!(
        "INSERT INTO field_visits (id, demand_id, collector_id, visit_year, visit_number, \
             visit_sequence_number, visit_type, citizen_response, expected_payment_date, \
             amount_collected, payment_id, latitude, longitude, device_id, \
             attendance_session_id, status, window_note, notes, created_at)
         VALUES ($1, $2, $3, $4,
             COALESCE((SELECT MAX(visit_number) FROM field_visits \
                 WHERE visit_year = $4), 0) + 1,
             COALESCE((SELECT MAX(visit_sequence_number) FROM field_visits \
                 WHERE demand_id = $2), 0) + 1,
             $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, NOW())
         RETURNING {FIELD_VISIT_COLUMNS}"
    );
    sqlx::query_as::<_, FieldVisit>(&query)
        .bind(visit.id)
        .bind(visit.demand_id)
        .bind(visit.collector_id)
        .bind(visit.visit_year)
        .bind(visit.visit_type)
        .bind(visit.citizen_response)
        .bind(visit.expected_payment_date)
        .bind(visit.amount_collected)
        .bind(visit.payment_id)
        .bind(visit.latitude)
        .bind(visit.longitude)
        .bind(visit.device_id.as_deref())
        .bind(visit.attendance_session_id)
        .bind(visit.status)
        .bind(visit.window_note.as_deref())
        .bind(visit.notes.as_deref())
        .fetch_one(conn)
        .await
        .map_err(map_db_error)
}

pub async fn list_for_demand(
    pool: &PgPool,
    demand_id: Uuid,
    limit: i64,
) -> AppResult<Vec<FieldVisit>> {
    let query = format!(
        "SELECT {FIELD_VISIT_COLUMNS}
         FROM field_visits
         WHERE demand_id = $1
         ORDER BY created_at DESC
         LIMIT $2"
    );
    sqlx::query_as::<_, FieldVisit>(&query)
        .bind(demand_id)
        .bind(clamp_limit(limit))
        .fetch_all(pool)
        .await
        .map_err(map_db_error)
}

/// The attendance session covering `at`, if the collector has one open.
pub async fn find_open_session_tx(
    conn: &mut PgConnection,
    collector_id: Uuid,
    at: DateTime<Utc>,
) -> AppResult<Option<AttendanceSession>> {
    sqlx::query_as::<_, AttendanceSession>(
        "SELECT id, employee_id, login_at, logout_at
         FROM attendance_sessions
         WHERE employee_id = $1
           AND login_at <= $2
           AND (logout_at IS NULL OR logout_at >= $2)
         ORDER BY login_at DESC
         LIMIT 1",
    )
    .bind(collector_id)
    .bind(at)
    .fetch_optional(conn)
    .await
    .map_err(map_db_error)
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_payment_tx(
    conn: &mut PgConnection,
    payment_id: Uuid,
    demand_id: Uuid,
    amount: Decimal,
    payment_mode: &str,
    payment_date: NaiveDate,
    receipt_number: &str,
    collected_by: Uuid,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO payments (id, demand_id, amount, payment_mode, payment_date, \
             receipt_number, collected_by, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())",
    )
    .bind(payment_id)
    .bind(demand_id)
    .bind(amount)
    .bind(payment_mode)
    .bind(payment_date)
    .bind(receipt_number)
    .bind(collected_by)
    .execute(conn)
    .await
    .map_err(map_db_error)?;
    Ok(())
}
