//! Health check module
//! Reports the state of the storage backends the payment flow depends on

use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info};

#[cfg(feature = "cache")]
use crate::cache::RedisPool;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub providers: Vec<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    /// Not configured in this deployment.
    Skipped,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            providers: Vec::new(),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn skipped(details: &str) -> Self {
        Self {
            status: ComponentState::Skipped,
            response_time_ms: None,
            details: Some(details.to_string()),
        }
    }
}

type CheckResult = Result<u128, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Clone, Default)]
pub struct HealthChecker {
    #[cfg(feature = "database")]
    db_pool: Option<sqlx::PgPool>,
    #[cfg(feature = "cache")]
    cache: Option<RedisPool>,
    providers: Vec<String>,
}

impl HealthChecker {
    pub fn new(providers: Vec<String>) -> Self {
        Self {
            providers,
            ..Default::default()
        }
    }

    pub fn with_providers(mut self, providers: Vec<String>) -> Self {
        self.providers = providers;
        self
    }

    #[cfg(feature = "database")]
    pub fn with_database(mut self, pool: Option<sqlx::PgPool>) -> Self {
        self.db_pool = pool;
        self
    }

    #[cfg(feature = "cache")]
    pub fn with_cache(mut self, pool: Option<RedisPool>) -> Self {
        self.cache = pool;
        self
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus {
            providers: self.providers.clone(),
            ..Default::default()
        };

        #[cfg(feature = "database")]
        {
            let component = match &self.db_pool {
                Some(pool) => probe("database", check_database_health(pool)).await,
                None => ComponentHealth::skipped("audit log kept in memory"),
            };
            health_status.checks.insert("database".to_string(), component);
        }

        #[cfg(feature = "cache")]
        {
            let component = match &self.cache {
                Some(pool) => probe("cache", check_cache_health(pool)).await,
                None => ComponentHealth::skipped("callback state kept in memory"),
            };
            health_status.checks.insert("cache".to_string(), component);
        }

        if health_status
            .checks
            .values()
            .any(|c| c.status == ComponentState::Down)
            || self.providers.is_empty()
        {
            health_status.status = HealthState::Unhealthy;
        }

        health_status
    }
}

async fn probe(name: &str, check: impl Future<Output = CheckResult>) -> ComponentHealth {
    match timeout(Duration::from_secs(5), check).await {
        Ok(Ok(response_time)) => {
            info!("{} health check: OK ({}ms)", name, response_time);
            ComponentHealth::up(Some(response_time))
        }
        Ok(Err(e)) => {
            error!("{} health check failed: {}", name, e);
            ComponentHealth::down(Some(e.to_string()))
        }
        Err(_) => {
            error!("{} health check timed out", name);
            ComponentHealth::down(Some("Timeout".to_string()))
        }
    }
}

#[cfg(feature = "database")]
pub async fn check_database_health(pool: &sqlx::PgPool) -> CheckResult {
    let start = Instant::now();
    crate::database::health_check(pool).await?;
    Ok(start.elapsed().as_millis())
}

#[cfg(feature = "cache")]
pub async fn check_cache_health(pool: &RedisPool) -> CheckResult {
    let start = Instant::now();
    crate::cache::health_check(pool).await?;
    Ok(start.elapsed().as_millis())
}
