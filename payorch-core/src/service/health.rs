//! Liveness of the two ports.

use crate::gateway::PaymentGateway;
use crate::store::PaymentStore;
use payorch_sdk::objects::{DependencyStatus, HealthResponse};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    Database,
    Gateway,
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dependency::Database => f.write_str("database"),
            Dependency::Gateway => f.write_str("gateway"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyFailure {
    pub dependency: Dependency,
    pub message: String,
}

/// Every failing dependency of one health check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct HealthError {
    pub failures: Vec<DependencyFailure>,
}

impl std::fmt::Display for HealthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("unhealthy: ")?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", failure.dependency, failure.message)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub database: Result<(), String>,
    pub gateway: Result<(), String>,
    pub checked_at: time::OffsetDateTime,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.database.is_ok() && self.gateway.is_ok()
    }

    pub fn failures(&self) -> Vec<DependencyFailure> {
        [
            (Dependency::Database, &self.database),
            (Dependency::Gateway, &self.gateway),
        ]
        .into_iter()
        .filter_map(|(dependency, result)| {
            result.as_ref().err().map(|message| DependencyFailure {
                dependency,
                message: message.clone(),
            })
        })
        .collect()
    }

    pub fn into_result(self) -> Result<(), HealthError> {
        let failures = self.failures();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(HealthError { failures })
        }
    }
}

fn dependency_status(result: &Result<(), String>) -> DependencyStatus {
    DependencyStatus {
        ok: result.is_ok(),
        error: result.as_ref().err().cloned(),
    }
}

impl From<&HealthReport> for HealthResponse {
    fn from(report: &HealthReport) -> Self {
        HealthResponse {
            healthy: report.is_healthy(),
            database: dependency_status(&report.database),
            gateway: dependency_status(&report.gateway),
            checked_at: report.checked_at.unix_timestamp(),
        }
    }
}

pub struct HealthMonitor {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            timeout,
        }
    }

    /// Pings both dependencies concurrently. Always runs both checks and
    /// never fails itself.
    pub async fn check(&self) -> HealthReport {
        let database = async {
            match tokio::time::timeout(self.timeout, self.store.ping()).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("ping timed out after {:?}", self.timeout)),
            }
        };
        let gateway = async {
            match tokio::time::timeout(self.timeout, self.gateway.ping()).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("ping timed out after {:?}", self.timeout)),
            }
        };
        let (database, gateway) = tokio::join!(database, gateway);
        HealthReport {
            database,
            gateway,
            checked_at: time::OffsetDateTime::now_utc(),
        }
    }
}
