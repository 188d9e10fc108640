use std::sync::Arc;

use uuid::Uuid;

use crate::{
    auth::ROLE_ADMIN,
    error::{AppError, AppResult},
    models::Employee,
    state::AppState,
};

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

/// Ward ids currently assigned to a collector, cached for a short TTL so
/// task listing does not hit the assignments table on every request.
pub async fn assigned_wards(state: &AppState, collector_id: Uuid) -> AppResult<Arc<Vec<String>>> {
    let cache_key = collector_id.to_string();
    if let Some(cached) = state.ward_cache.get(&cache_key).await {
        return Ok(cached);
    }

    let pool = db_pool(state)?;
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT ward_id
         FROM ward_assignments
         WHERE employee_id = $1 AND is_active = TRUE
         ORDER BY ward_id
         LIMIT 200",
    )
    .bind(collector_id)
    .fetch_all(pool)
    .await
    .map_err(|error| AppError::Dependency(format!("Database request failed: {error}")))?;

    let wards: Arc<Vec<String>> = Arc::new(rows.into_iter().map(|(ward_id,)| ward_id).collect());
    state.ward_cache.insert(cache_key, wards.clone()).await;
    Ok(wards)
}

/// Admins see every ward; collectors only the wards assigned to them.
pub async fn assert_ward_access(
    state: &AppState,
    employee: &Employee,
    ward_id: &str,
) -> AppResult<()> {
    if employee.role == ROLE_ADMIN {
        return Ok(());
    }

    let wards = assigned_wards(state, employee.id).await?;
    if wards.iter().any(|assigned| assigned == ward_id) {
        return Ok(());
    }

    Err(AppError::Forbidden(format!(
        "Forbidden: ward '{ward_id}' is not assigned to this collector."
    )))
}
