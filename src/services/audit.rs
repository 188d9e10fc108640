use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

/// Best-effort write to the collaborator audit sink. Failures are logged
/// and swallowed; an audit outage must never fail the business call.
/// `metadata` carries context beyond the entity snapshots, such as rule
/// identity or run parameters.
#[allow(clippy::too_many_arguments)]
pub async fn write_audit_log(
    pool: Option<&PgPool>,
    actor_id: Option<Uuid>,
    action_type: &str,
    entity_type: &str,
    entity_id: Option<Uuid>,
    before: Option<Value>,
    after: Option<Value>,
    description: Option<&str>,
    metadata: Option<Value>,
) {
    let Some(pool) = pool else {
        return;
    };

    let result = sqlx::query(
        "INSERT INTO audit_logs (id, actor_id, action_type, entity_type, entity_id, \
             before_state, after_state, description, metadata, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())",
    )
    .bind(Uuid::new_v4())
    .bind(actor_id)
    .bind(action_type)
    .bind(entity_type)
    .bind(entity_id)
    .bind(before)
    .bind(after)
    .bind(description)
    .bind(metadata)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!(
            action_type,
            entity_type,
            error = %e,
            "Failed to write audit log entry"
        );
    }
}
