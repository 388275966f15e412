use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{extract::State, Json};
use serde::Serialize;

use crate::lifecycle::BackgroundTasks;
use crate::observability::{TrafficMeter, TrafficSnapshot};

/// Shared state for the debug endpoints.
#[derive(Clone)]
pub struct VarsState {
    pub meter: Arc<TrafficMeter>,
    pub background: BackgroundTasks,
}

#[derive(Debug, Serialize)]
pub struct DebugVars {
    pub version: &'static str,
    pub timestamp: u64,
    pub background_tasks: usize,
    #[serde(flatten)]
    pub traffic: TrafficSnapshot,
}

pub async fn get_vars(State(state): State<VarsState>) -> Json<DebugVars> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    Json(DebugVars {
        version: env!("CARGO_PKG_VERSION"),
        timestamp,
        background_tasks: state.background.outstanding(),
        traffic: state.meter.snapshot(),
    })
}
