use axum::http::HeaderMap;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::Employee,
    state::AppState,
};

/// Header set by the municipal SSO gateway after it has verified the
/// caller. The service trusts it; the gateway strips it from external
/// traffic.
pub const EMPLOYEE_ID_HEADER: &str = "x-employee-id";
/// Dev-only role override, honored only outside production when
/// AUTH_DEV_OVERRIDES_ENABLED is set.
pub const EMPLOYEE_ROLE_HEADER: &str = "x-employee-role";

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_COLLECTOR: &str = "collector";

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

/// Resolves the calling employee from the gateway identity header.
pub async fn require_employee(state: &AppState, headers: &HeaderMap) -> AppResult<Employee> {
    let raw_id = header_value(headers, EMPLOYEE_ID_HEADER).ok_or_else(|| {
        AppError::Unauthorized("Unauthorized: missing employee identity.".to_string())
    })?;
    let employee_id = Uuid::parse_str(&raw_id).map_err(|_| {
        AppError::Unauthorized("Unauthorized: employee identity is not a valid id.".to_string())
    })?;

    if state.config.auth_dev_overrides_enabled() {
        if let Some(role) = header_value(headers, EMPLOYEE_ROLE_HEADER) {
            return Ok(Employee {
                id: employee_id,
                full_name: "Dev Override".to_string(),
                role,
                is_active: true,
            });
        }
    }

    let pool = db_pool(state)?;
    let employee = sqlx::query_as::<_, Employee>(
        "SELECT id, full_name, role, is_active
         FROM employees
         WHERE id = $1
         LIMIT 1",
    )
    .bind(employee_id)
    .fetch_optional(pool)
    .await
    .map_err(|error| AppError::Dependency(format!("Database request failed: {error}")))?
    .ok_or_else(|| AppError::Unauthorized("Unauthorized: unknown employee.".to_string()))?;

    if !employee.is_active {
        return Err(AppError::Forbidden(
            "Forbidden: employee account is deactivated.".to_string(),
        ));
    }

    Ok(employee)
}

pub fn assert_role(employee: &Employee, allowed_roles: &[&str]) -> AppResult<()> {
    if allowed_roles.contains(&employee.role.as_str()) {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "Forbidden: role '{}' is not allowed for this action.",
        employee.role
    )))
}

/// Collectors and admins may act on field endpoints; admins alone on
/// administrative ones.
pub async fn require_collector(state: &AppState, headers: &HeaderMap) -> AppResult<Employee> {
    let employee = require_employee(state, headers).await?;
    assert_role(&employee, &[ROLE_COLLECTOR, ROLE_ADMIN])?;
    Ok(employee)
}

pub async fn require_admin(state: &AppState, headers: &HeaderMap) -> AppResult<Employee> {
    let employee = require_employee(state, headers).await?;
    assert_role(&employee, &[ROLE_ADMIN])?;
    Ok(employee)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee_with_role(role: &str) -> Employee {
        Employee {
            id: Uuid::nil(),
            full_name: "Test Collector".to_string(),
            role: role.to_string(),
            is_active: true,
        }
    }

    #[test]
    fn assert_role_accepts_listed_roles() {
        let employee = employee_with_role(ROLE_COLLECTOR);
        assert!(assert_role(&employee, &[ROLE_COLLECTOR, ROLE_ADMIN]).is_ok());
    }

    #[test]
    fn assert_role_rejects_other_roles() {
        let employee = employee_with_role("clerk");
        let error = assert_role(&employee, &[ROLE_ADMIN]).unwrap_err();
        assert!(matches!(error, AppError::Forbidden(_)));
    }

    #[test]
    fn header_value_trims_and_drops_empty() {
        let mut headers = HeaderMap::new();
        headers.insert(EMPLOYEE_ID_HEADER, "  abc  ".parse().unwrap());
        assert_eq!(
            header_value(&headers, EMPLOYEE_ID_HEADER),
            Some("abc".to_string())
        );

        headers.insert(EMPLOYEE_ROLE_HEADER, "   ".parse().unwrap());
        assert_eq!(header_value(&headers, EMPLOYEE_ROLE_HEADER), None);
    }
}
