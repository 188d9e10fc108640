pub mod collector_tasks;
pub mod demands;
pub mod field_visits;
pub mod follow_ups;
pub mod penalty_rules;

use std::future::Future;

use crate::error::{AppError, AppResult};

pub(crate) fn map_db_error(error: sqlx::Error) -> AppError {
    let message = error.to_string();
    tracing::error!(db_error = %message, "Database query failed");

    if message.contains("23505")
        || message
            .to_ascii_lowercase()
            .contains("duplicate key value violates unique constraint")
    {
        return AppError::Conflict("Duplicate value violates a unique constraint.".to_string());
    }
    AppError::Dependency("Database operation failed.".to_string())
}

/// Sort key to resume a bounded scan from: the last row's key while
/// pages keep filling, `None` once a short page ends the scan.
pub(crate) fn next_scan_key<T, K>(
    page: &[T],
    page_size: i64,
    key: impl Fn(&T) -> K,
) -> Option<K> {
    if (page.len() as i64) < page_size.max(1) {
        return None;
    }
    page.last().map(key)
}

/// Re-runs a write whose unique-index collision surfaces as a Conflict,
/// for writers that mint their own sequence numbers concurrently. Any
/// other outcome is returned as-is; a conflict on the final attempt
/// propagates.
pub(crate) async fn retry_on_conflict<T, F, Fut>(attempts: u32, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut result = op().await;
    for _ in 1..attempts {
        match result {
            Err(AppError::Conflict(_)) => result = op().await,
            other => return other,
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn scan_resumes_only_while_pages_fill() {
        let full = [(1, "a"), (2, "b"), (3, "c")];
        assert_eq!(next_scan_key(&full, 3, |row| row.0), Some(3));

        let short = [(4, "d")];
        assert_eq!(next_scan_key(&short, 3, |row| row.0), None);

        let empty: [(i32, &str); 0] = [];
        assert_eq!(next_scan_key(&empty, 3, |row| row.0), None);
    }

    #[tokio::test]
    async fn conflicts_are_retried_until_a_writer_wins() {
        let calls = Cell::new(0u32);
        let result = retry_on_conflict(3, || {
            calls.set(calls.get() + 1);
            let attempt = calls.get();
            async move {
                if attempt < 3 {
                    Err(AppError::Conflict("number already taken".to_string()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.ok(), Some(3));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn persistent_conflict_surfaces_after_the_last_attempt() {
        let calls = Cell::new(0u32);
        let result: AppResult<()> = retry_on_conflict(2, || {
            calls.set(calls.get() + 1);
            async { Err(AppError::Conflict("number already taken".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = Cell::new(0u32);
        let result: AppResult<()> = retry_on_conflict(3, || {
            calls.set(calls.get() + 1);
            async { Err(AppError::Dependency("database is down".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(AppError::Dependency(_))));
        assert_eq!(calls.get(), 1);
    }
}
