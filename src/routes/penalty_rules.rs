use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::{
    auth::require_admin,
    error::{AppError, AppResult},
    repository::penalty_rules,
    schemas::{ensure_non_negative, validate_input, CreatePenaltyRuleInput, PenaltyRulesQuery},
    services::audit::write_audit_log,
    state::AppState,
};

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route(
        "/penalty-rules",
        axum::routing::get(list_rules).post(create_rule),
    )
}

/// Rules are edited by creating a new row with a later `effective_from`;
/// existing rows are never destructively updated.
async fn create_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePenaltyRuleInput>,
) -> AppResult<impl IntoResponse> {
    let admin = require_admin(&state, &headers).await?;
    validate_input(&payload)?;
    ensure_non_negative("penalty_value", payload.penalty_value)?;
    ensure_non_negative("interest_value", payload.interest_value)?;
    if let Some(cap) = payload.max_penalty_amount {
        ensure_non_negative("max_penalty_amount", cap)?;
    }
    if let Some(cap) = payload.max_interest_amount {
        ensure_non_negative("max_interest_amount", cap)?;
    }
    if payload.grace_period_days < 0 {
        return Err(AppError::UnprocessableEntity(
            "Validation failed: grace_period_days must not be negative".to_string(),
        ));
    }
    if let Some(effective_to) = payload.effective_to {
        if effective_to < payload.effective_from {
            return Err(AppError::UnprocessableEntity(
                "Validation failed: effective_to precedes effective_from".to_string(),
            ));
        }
    }
    let pool = db_pool(&state)?;

    let rule = penalty_rules::insert(pool, &payload).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(admin.id),
        "create",
        "penalty_rules",
        Some(rule.id),
        None,
        serde_json::to_value(&rule).ok(),
        Some(&format!(
            "Penalty rule for {} effective {}",
            rule.financial_year, rule.effective_from
        )),
        None,
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(rule)))
}

async fn list_rules(
    State(state): State<AppState>,
    Query(query): Query<PenaltyRulesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let rules = penalty_rules::list(pool, &query).await?;
    let count = rules.len();
    Ok(Json(json!({ "data": rules, "count": count })))
}
