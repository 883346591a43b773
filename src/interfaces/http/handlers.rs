//! HTTP handlers: heartbeat ingestion, health check, liveness monitoring

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::registry::{EntryStatus, SharedHeartbeatRegistry};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub registry: SharedHeartbeatRegistry,
    pub started_at: Arc<Instant>,
}

impl AppState {
    pub fn new(registry: SharedHeartbeatRegistry) -> Self {
        Self {
            registry,
            started_at: Arc::new(Instant::now()),
        }
    }
}

/// Record a heartbeat signal for the requested key.
///
/// GET only; the router answers anything else with 405. The write has
/// no failure mode visible to the caller, so this always returns 200.
pub async fn record_heartbeat(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> StatusCode {
    // the wildcard capture strips the leading slash; restore it so
    // keys in events and monitoring output read as request paths
    state.registry.record_signal(&format!("/{key}"));
    StatusCode::OK
}

/// Service health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub tracked_entries: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        tracked_entries: state.registry.len(),
    })
}

/// Per-key liveness snapshot
#[derive(Debug, Serialize)]
pub struct EntriesResponse {
    pub count: usize,
    pub entries: Vec<EntryStatus>,
}

pub async fn list_entries(State(state): State<AppState>) -> Json<EntriesResponse> {
    let mut entries = state.registry.statuses();
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    Json(EntriesResponse {
        count: entries.len(),
        entries,
    })
}
