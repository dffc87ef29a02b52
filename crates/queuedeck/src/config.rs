use std::time::Duration;

use crate::engine::bull::DEFAULT_PREFIX;

/// Runtime configuration, loaded from the environment (and `.env` if present).
///
/// Every `QUEUEDECK_*` variable is read first; a few also accept the
/// unprefixed name so a shared `.env` keeps working.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub admin_addr: Option<String>,
    pub key_prefix: String,
    pub dashboard_concurrency: usize,
    pub migrate_on_startup: bool,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub redis_connect_timeout: Duration,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env_or_fallback("QUEUEDECK_DATABASE_URL", "DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let admin_addr = match env_or_fallback("QUEUEDECK_ADMIN_ADDR", "ADMIN_ADDR") {
            Some(raw) => normalize_optional_addr(&raw),
            None => Some("0.0.0.0:3333".to_string()),
        };

        let key_prefix =
            env_var("QUEUEDECK_KEY_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string());

        let dashboard_concurrency = env_var("QUEUEDECK_DASHBOARD_CONCURRENCY")
            .and_then(|s| s.parse().ok())
            .unwrap_or(4usize)
            .max(1);

        let migrate_on_startup = env_bool("QUEUEDECK_MIGRATE_ON_STARTUP").unwrap_or(false);

        let db_max_connections = env_var("QUEUEDECK_DB_MAX_CONNECTIONS")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(4)
            .clamp(1, 32);

        let db_acquire_timeout_secs = env_var("QUEUEDECK_DB_ACQUIRE_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(10)
            .clamp(1, 60);

        let redis_connect_timeout = env_var("QUEUEDECK_REDIS_CONNECT_TIMEOUT_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(2_000));

        let log_json = env_bool("QUEUEDECK_LOG_JSON").unwrap_or(false);

        Ok(Self {
            database_url,
            admin_addr,
            key_prefix,
            dashboard_concurrency,
            migrate_on_startup,
            db_max_connections,
            db_acquire_timeout_secs,
            redis_connect_timeout,
            log_json,
        })
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    env_var(primary).or_else(|| env_var(fallback))
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_addr_can_be_switched_off() {
        assert_eq!(normalize_optional_addr("off"), None);
        assert_eq!(normalize_optional_addr(" NONE "), None);
        assert_eq!(normalize_optional_addr(""), None);
        assert_eq!(
            normalize_optional_addr(" 127.0.0.1:8080 "),
            Some("127.0.0.1:8080".to_string())
        );
    }
}
