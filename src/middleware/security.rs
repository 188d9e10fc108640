use axum::{
    extract::{Request, State},
    http::header::HOST,
    middleware::Next,
    response::Response,
};

use crate::{error::AppError, state::AppState};

/// Rejects requests whose Host header is not on the configured allow
/// list. `*` disables the check; `*.example.org` matches subdomains.
pub async fn enforce_trusted_hosts(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let trusted = &state.config.trusted_hosts;
    if trusted.iter().any(|entry| entry.trim() == "*") {
        return Ok(next.run(request).await);
    }

    let host = request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let host_only = host.split(':').next().unwrap_or_default();

    if trusted.iter().any(|entry| host_matches(entry, host_only)) {
        return Ok(next.run(request).await);
    }

    Err(AppError::BadRequest(format!(
        "Untrusted host header: '{host}'"
    )))
}

fn host_matches(allowed: &str, host: &str) -> bool {
    let allowed = allowed.trim();
    if allowed.is_empty() || host.is_empty() {
        return false;
    }
    if let Some(suffix) = allowed.strip_prefix("*.") {
        return host.eq_ignore_ascii_case(suffix)
            || host.to_ascii_lowercase().ends_with(&format!(".{}", suffix.to_ascii_lowercase()));
    }
    allowed.eq_ignore_ascii_case(host)
}

#[cfg(test)]
mod tests {
    use super::host_matches;

    #[test]
    fn exact_host_matches_case_insensitively() {
        assert!(host_matches("api.ulb.gov.in", "API.ULB.GOV.IN"));
        assert!(!host_matches("api.ulb.gov.in", "other.ulb.gov.in"));
    }

    #[test]
    fn wildcard_prefix_matches_subdomains() {
        assert!(host_matches("*.ulb.gov.in", "api.ulb.gov.in"));
        assert!(host_matches("*.ulb.gov.in", "ulb.gov.in"));
        assert!(!host_matches("*.ulb.gov.in", "ulb.gov.in.evil.test"));
    }

    #[test]
    fn empty_values_never_match() {
        assert!(!host_matches("", "api.ulb.gov.in"));
        assert!(!host_matches("api.ulb.gov.in", ""));
    }
}
