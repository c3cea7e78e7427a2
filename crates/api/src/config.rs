use std::str::FromStr;
use std::time::Duration;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development; override via the
/// environment in production.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for background services (default: `30`).
    pub shutdown_timeout_secs: u64,
    pub jwt: JwtConfig,
    /// Postgres connection string. Required for the `postgres` backend.
    pub database_url: Option<String>,
    pub store_backend: StoreBackend,
    pub workflow: WorkflowConfig,
    pub delivery: DeliveryConfig,
}

/// Which [`WorkflowStore`](stride_db::WorkflowStore) implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Volatile store, for demos and local experiments.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// Workflow rules that vary per deployment.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// How long a notification stays listable (default: `30` days).
    pub notification_retention_days: i64,
    /// Reject initiative transitions while the linked goal is frozen
    /// (default: `false`).
    pub couple_initiatives_to_goal_freeze: bool,
    /// Overdue sweep period in seconds (default: `300`).
    pub overdue_sweep_secs: u64,
    /// Scheduled-unfreeze check period in seconds (default: `60`).
    pub scheduled_unfreeze_sweep_secs: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            notification_retention_days: 30,
            couple_initiatives_to_goal_freeze: false,
            overdue_sweep_secs: 300,
            scheduled_unfreeze_sweep_secs: 60,
        }
    }
}

/// Real-time push tuning.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Interval between protocol Ping frames (default: `30`).
    pub heartbeat_secs: u64,
    /// Channels silent for longer than this are dropped (default: `90`).
    pub liveness_grace_secs: u64,
    /// Outbound queue depth per channel (default: `64`).
    pub channel_capacity: usize,
    /// Upper bound on a single socket write (default: `5000`).
    pub send_timeout_ms: u64,
}

impl DeliveryConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn liveness_grace(&self) -> Duration {
        Duration::from_secs(self.liveness_grace_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 30,
            liveness_grace_secs: 90,
            channel_capacity: 64,
            send_timeout_ms: 5000,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                              | Default                 |
    /// |--------------------------------------|-------------------------|
    /// | `HOST`                               | `0.0.0.0`               |
    /// | `PORT`                               | `3000`                  |
    /// | `CORS_ORIGINS`                       | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`               | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`              | `30`                    |
    /// | `DATABASE_URL`                       | --                      |
    /// | `STORE_BACKEND`                      | `postgres`              |
    /// | `NOTIFICATION_RETENTION_DAYS`        | `30`                    |
    /// | `COUPLE_INITIATIVES_TO_GOAL_FREEZE`  | `false`                 |
    /// | `OVERDUE_SWEEP_SECS`                 | `300`                   |
    /// | `SCHEDULED_UNFREEZE_SWEEP_SECS`      | `60`                    |
    /// | `WS_HEARTBEAT_SECS`                  | `30`                    |
    /// | `WS_LIVENESS_GRACE_SECS`             | `90`                    |
    /// | `WS_CHANNEL_CAPACITY`                | `64`                    |
    /// | `WS_SEND_TIMEOUT_MS`                 | `5000`                  |
    ///
    /// # Panics
    ///
    /// Panics on a value that does not parse, so misconfiguration fails at
    /// startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let workflow_defaults = WorkflowConfig::default();
        let workflow = WorkflowConfig {
            notification_retention_days: env_or(
                "NOTIFICATION_RETENTION_DAYS",
                workflow_defaults.notification_retention_days,
            ),
            couple_initiatives_to_goal_freeze: env_or(
                "COUPLE_INITIATIVES_TO_GOAL_FREEZE",
                workflow_defaults.couple_initiatives_to_goal_freeze,
            ),
            overdue_sweep_secs: env_or("OVERDUE_SWEEP_SECS", workflow_defaults.overdue_sweep_secs),
            scheduled_unfreeze_sweep_secs: env_or(
                "SCHEDULED_UNFREEZE_SWEEP_SECS",
                workflow_defaults.scheduled_unfreeze_sweep_secs,
            ),
        };

        let delivery_defaults = DeliveryConfig::default();
        let delivery = DeliveryConfig {
            heartbeat_secs: env_or("WS_HEARTBEAT_SECS", delivery_defaults.heartbeat_secs),
            liveness_grace_secs: env_or(
                "WS_LIVENESS_GRACE_SECS",
                delivery_defaults.liveness_grace_secs,
            ),
            channel_capacity: env_or("WS_CHANNEL_CAPACITY", delivery_defaults.channel_capacity),
            send_timeout_ms: env_or("WS_SEND_TIMEOUT_MS", delivery_defaults.send_timeout_ms),
        };

        Self {
            host,
            port: env_or("PORT", 3000),
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30),
            jwt: JwtConfig::from_env(),
            database_url: std::env::var("DATABASE_URL").ok(),
            store_backend: env_or("STORE_BACKEND", StoreBackend::Postgres),
            workflow,
            delivery,
        }
    }
}

/// Parse `key` from the environment, falling back to `default` when unset.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} has an invalid value '{raw}': {e}")),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_backend_parses_case_insensitively() {
        assert_eq!("Memory".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert_eq!("pg".parse::<StoreBackend>(), Ok(StoreBackend::Postgres));
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn unset_variable_uses_default() {
        let value: u64 = env_or("STRIDE_TEST_SURELY_UNSET_VARIABLE", 42);
        assert_eq!(value, 42);
    }
}
