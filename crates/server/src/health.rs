use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{SecondsFormat, Utc};
use handoff_core::sla::SlaMonitor;
use handoff_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    monitor: Option<Arc<SlaMonitor>>,
}

impl HealthState {
    /// `monitor` is `None` when the SLA monitor is disabled by config.
    pub fn new(db_pool: DbPool, monitor: Option<Arc<SlaMonitor>>) -> Self {
        Self { db_pool, monitor }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub sla_monitor: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "handoff-server runtime initialized".to_string(),
        },
        database,
        sla_monitor: monitor_check(state.monitor.as_deref()).await,
        checked_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

// Informational only; a quiet monitor does not make the service unready.
async fn monitor_check(monitor: Option<&SlaMonitor>) -> HealthCheck {
    let Some(monitor) = monitor else {
        return HealthCheck { status: "disabled", detail: "SLA monitor is disabled".to_string() };
    };

    match monitor.last_sweep().await {
        Some(report) => HealthCheck {
            status: "ready",
            detail: format!(
                "last sweep at {} escalated {} request(s)",
                report.swept_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                report.escalated_count()
            ),
        },
        None => HealthCheck { status: "pending", detail: "no sweep has completed yet".to_string() },
    }
}
