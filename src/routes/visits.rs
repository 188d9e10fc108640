use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::{
    auth::require_collector,
    error::{AppError, AppResult},
    models::FollowUp,
    repository::{demands, field_visits, follow_ups},
    schemas::{validate_input, DemandPath, RecordVisitInput, VisitsQuery},
    services::visits::{record_visit, RecordedVisit},
    state::AppState,
    wards::assert_ward_access,
};

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/visits", axum::routing::post(create_visit))
        .route(
            "/demands/{demand_id}/visits",
            axum::routing::get(list_demand_visits),
        )
        .route(
            "/demands/{demand_id}/follow-up",
            axum::routing::get(get_demand_follow_up),
        )
}

async fn create_visit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RecordVisitInput>,
) -> AppResult<impl IntoResponse> {
    let collector = require_collector(&state, &headers).await?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let property = demands::property_for_demand(pool, payload.demand_id).await?;
    assert_ward_access(&state, &collector, &property.ward_id).await?;

    let recorded: RecordedVisit =
        record_visit(pool, state.config.ulb_timezone, &collector, &payload).await?;
    Ok((axum::http::StatusCode::CREATED, Json(recorded)))
}

async fn list_demand_visits(
    State(state): State<AppState>,
    Path(path): Path<DemandPath>,
    Query(query): Query<VisitsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let collector = require_collector(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let property = demands::property_for_demand(pool, path.demand_id).await?;
    assert_ward_access(&state, &collector, &property.ward_id).await?;

    let visits = field_visits::list_for_demand(pool, path.demand_id, query.limit).await?;
    let count = visits.len();
    Ok(Json(json!({ "data": visits, "count": count })))
}

async fn get_demand_follow_up(
    State(state): State<AppState>,
    Path(path): Path<DemandPath>,
    headers: HeaderMap,
) -> AppResult<Json<FollowUp>> {
    let collector = require_collector(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let property = demands::property_for_demand(pool, path.demand_id).await?;
    assert_ward_access(&state, &collector, &property.ward_id).await?;

    let follow_up = follow_ups::get_by_demand(pool, path.demand_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound("No follow-up exists for this demand yet.".to_string())
        })?;
    Ok(Json(follow_up))
}
