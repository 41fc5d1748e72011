//! Per-client fixed-window rate limiting.
//!
//! Counters live in the shared store so every server instance sees the same
//! counts.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use interfaces::store::window_start;
use tracing::warn;

/// Client address: first `x-forwarded-for` hop, then `x-real-ip`.
pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or("unknown")
        .to_string()
}

/// Seconds until the window containing `now` closes.
pub fn retry_after(now: DateTime<Utc>, window: Duration) -> u64 {
    let end = window_start(now, window) + window;
    (end - now).num_seconds().max(1) as u64
}

/// Count a request from this client against `scope` and reject it once the
/// window's limit is exceeded.
pub async fn enforce(
    state: &AppState,
    scope: &str,
    headers: &HeaderMap,
    limit: u32,
    window: Duration,
) -> ApiResult<()> {
    let ip = client_ip(headers);
    let key = format!("{}:{}", scope, ip);
    let now = Utc::now();

    let count = state.store.hit(&key, window, now).await?;
    if count > limit {
        warn!(scope, ip = %ip, count, limit, "Rate limit exceeded");
        return Err(ApiError::RateLimited {
            retry_after_secs: retry_after(now, window),
        });
    }
    Ok(())
}
