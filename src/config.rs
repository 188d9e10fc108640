#![allow(dead_code)]

use std::env;

use chrono_tz::Tz;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub trusted_hosts: Vec<String>,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,
    pub database_url: Option<String>,
    pub db_pool_max_connections: u32,
    pub db_pool_min_connections: u32,
    pub db_pool_acquire_timeout_seconds: u64,
    pub db_pool_idle_timeout_seconds: u64,
    /// Civil calendar for every "today" in the engine: overdue days,
    /// accrual windows, task dates. One timezone for the whole ULB.
    pub ulb_timezone: Tz,
    pub scheduler_enabled: bool,
    pub accrual_run_hour: u32,
    pub task_generation_run_hour: u32,
    pub accrual_batch_limit: i64,
    pub task_generation_collector_limit: i64,
    pub ward_cache_ttl_seconds: u64,
    pub ward_cache_max_entries: u64,
    pub dev_auth_overrides_enabled: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            app_name: env_or("APP_NAME", "CiviTax Arrears API"),
            environment: env_or("ENVIRONMENT", "development"),
            api_prefix: normalize_prefix(&env_or("API_PREFIX", "/v1")),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8000),
            cors_origins: parse_csv(&env_or("CORS_ORIGINS", "http://localhost:3000")),
            trusted_hosts: parse_csv(&env_or("TRUSTED_HOSTS", "localhost,127.0.0.1")),
            rate_limit_per_second: env_parse_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: env_parse_or("RATE_LIMIT_BURST_SIZE", 100),
            database_url: env_opt("DATABASE_URL"),
            db_pool_max_connections: env_parse_or("DB_POOL_MAX_CONNECTIONS", 5),
            db_pool_min_connections: env_parse_or("DB_POOL_MIN_CONNECTIONS", 1),
            db_pool_acquire_timeout_seconds: env_parse_or("DB_POOL_ACQUIRE_TIMEOUT_SECONDS", 5),
            db_pool_idle_timeout_seconds: env_parse_or("DB_POOL_IDLE_TIMEOUT_SECONDS", 600),
            ulb_timezone: parse_timezone(env_opt("ULB_TIMEZONE")),
            scheduler_enabled: env_parse_bool_or("SCHEDULER_ENABLED", true),
            accrual_run_hour: env_parse_or("ACCRUAL_RUN_HOUR", 1).min(23),
            task_generation_run_hour: env_parse_or("TASK_GENERATION_RUN_HOUR", 6).min(23),
            accrual_batch_limit: env_parse_or("ACCRUAL_BATCH_LIMIT", 5000),
            task_generation_collector_limit: env_parse_or("TASK_GENERATION_COLLECTOR_LIMIT", 500),
            ward_cache_ttl_seconds: env_parse_or("WARD_CACHE_TTL_SECONDS", 60),
            ward_cache_max_entries: env_parse_or("WARD_CACHE_MAX_ENTRIES", 10000),
            dev_auth_overrides_enabled: env_parse_bool_or("DEV_AUTH_OVERRIDES_ENABLED", false),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }

    pub fn auth_dev_overrides_enabled(&self) -> bool {
        if self.is_production() {
            return false;
        }
        self.dev_auth_overrides_enabled
    }
}

fn parse_timezone(raw: Option<String>) -> Tz {
    let Some(value) = raw else {
        return chrono_tz::Asia::Kolkata;
    };
    match value.trim().parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!(timezone = %value, "Invalid ULB_TIMEZONE, using Asia/Kolkata");
            chrono_tz::Asia::Kolkata
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_parse_bool_or(key: &str, default: bool) -> bool {
    match env_opt(key).as_deref().map(str::to_ascii_lowercase) {
        Some(value) if value == "1" || value == "true" || value == "yes" || value == "on" => true,
        Some(value) if value == "0" || value == "false" || value == "no" || value == "off" => false,
        Some(_) => default,
        None => default,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn normalize_prefix(raw: &str) -> String {
    let mut prefix = raw.trim().to_string();
    if prefix.is_empty() {
        return "/v1".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.ends_with('/') && prefix.len() > 1 {
        prefix.pop();
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::{normalize_prefix, parse_timezone};

    #[test]
    fn normalizes_prefix() {
        assert_eq!(normalize_prefix("v1"), "/v1");
        assert_eq!(normalize_prefix("/v1/"), "/v1");
        assert_eq!(normalize_prefix(""), "/v1");
    }

    #[test]
    fn timezone_falls_back_to_kolkata() {
        assert_eq!(parse_timezone(None), chrono_tz::Asia::Kolkata);
        assert_eq!(
            parse_timezone(Some("not/a-zone".to_string())),
            chrono_tz::Asia::Kolkata
        );
        assert_eq!(
            parse_timezone(Some("Asia/Colombo".to_string())),
            chrono_tz::Asia::Colombo
        );
    }
}
