use axum::{routing::get, Router};

use crate::state::AppState;

pub mod health;
pub mod penalty_rules;
pub mod runs;
pub mod tasks;
pub mod visits;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(visits::router())
        .merge(tasks::router())
        .merge(runs::router())
        .merge(penalty_rules::router())
}
