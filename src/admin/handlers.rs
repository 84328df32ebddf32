use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::http::server::AppState;
use crate::security::tiers::RateLimitTier;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub uptime_secs: u64,
    pub users: usize,
    pub access_lists: usize,
    pub rate_limit_enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TierStatus {
    pub tier: String,
    pub capacity: u32,
    pub window_secs: u64,
    pub retention_secs: u64,
    pub visitors: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        users: state.directory.user_count(),
        access_lists: state.directory.access_list_count(),
        rate_limit_enabled: state.pipeline.rate_limit_enabled(),
    })
}

/// Limits and tracked visitor counts per tier.
pub async fn get_limiter(State(state): State<AppState>) -> Json<Vec<TierStatus>> {
    let limiters = state.pipeline.limiters();
    let tiers = RateLimitTier::ALL
        .iter()
        .map(|tier| {
            let limiter = limiters.get(*tier);
            TierStatus {
                tier: tier.as_str().to_string(),
                capacity: limiter.capacity(),
                window_secs: limiter.window().as_secs(),
                retention_secs: limiter.retention().as_secs(),
                visitors: limiter.visitor_count(),
            }
        })
        .collect();

    Json(tiers)
}
