//! Stats endpoint types, time range resolution, and handler.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::server::AppState;
use crate::error::Error;
use crate::storage;

/// Query parameters for GET /v1/stats.
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub range: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub provider: Option<String>,
}

/// Preset time range options.
#[derive(Debug, Clone, Copy)]
pub enum RangePreset {
    Last1h,
    Last24h,
    Last7d,
    Last30d,
}

impl RangePreset {
    /// Parse a preset string into a RangePreset.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "last_1h" => Some(Self::Last1h),
            "last_24h" => Some(Self::Last24h),
            "last_7d" => Some(Self::Last7d),
            "last_30d" => Some(Self::Last30d),
            _ => None,
        }
    }

    /// Get the duration for this preset.
    pub fn duration(&self) -> Duration {
        match self {
            Self::Last1h => Duration::hours(1),
            Self::Last24h => Duration::hours(24),
            Self::Last7d => Duration::days(7),
            Self::Last30d => Duration::days(30),
        }
    }
}

/// Resolve the time range from query parameters.
///
/// Priority:
/// 1. Explicit `since`/`until` override everything
/// 2. `range` preset applied from current UTC time
/// 3. Default: last_7d
///
/// Returns `(since, until)` as UTC datetimes.
pub fn resolve_time_range(
    range: Option<&str>,
    since: Option<&str>,
    until: Option<&str>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), Error> {
    let now = Utc::now();

    let since_dt = if let Some(s) = since {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::Validation(format!("Invalid 'since' timestamp: {}", e)))?
    } else if let Some(r) = range {
        let preset = RangePreset::parse(r).ok_or_else(|| {
            Error::Validation(format!(
                "Invalid range '{}'. Supported: last_1h, last_24h, last_7d, last_30d",
                r
            ))
        })?;
        now - preset.duration()
    } else {
        // Default: last 7 days
        now - RangePreset::Last7d.duration()
    };

    let until_dt = if let Some(u) = until {
        DateTime::parse_from_rfc3339(u)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::Validation(format!("Invalid 'until' timestamp: {}", e)))?
    } else {
        now
    };

    Ok((since_dt, until_dt))
}

/// Top-level stats response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub since: String,
    pub until: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub counts: CountsSection,
    pub tokens: TokensSection,
    pub performance: PerformanceSection,
    pub providers: serde_json::Value,
}

/// Request count breakdown.
#[derive(Debug, Serialize)]
pub struct CountsSection {
    pub total: i64,
    pub success: i64,
    pub error: i64,
}

/// Token totals.
#[derive(Debug, Serialize)]
pub struct TokensSection {
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
}

/// Performance metrics.
#[derive(Debug, Serialize)]
pub struct PerformanceSection {
    pub avg_latency_ms: f64,
    /// Mean attempts per request; anything above 1.0 means retries or
    /// failovers are happening.
    pub avg_attempts: f64,
}

/// Handle GET /v1/stats -- aggregate request statistics.
pub async fn stats_handler(
    State(state): State<AppState>,
    Query(params): Query<StatsQuery>,
) -> Result<impl IntoResponse, Error> {
    let pool = state
        .db
        .as_ref()
        .ok_or_else(|| Error::NotFound("Request logging is not enabled".to_string()))?;

    // Resolve time range
    let (since_dt, until_dt) = resolve_time_range(
        params.range.as_deref(),
        params.since.as_deref(),
        params.until.as_deref(),
    )?;
    let since_str = since_dt.to_rfc3339();
    let until_str = until_dt.to_rfc3339();

    tracing::debug!(
        since = %since_str,
        until = %until_str,
        provider = ?params.provider,
        "Stats query"
    );

    // Validate provider filter (404 for non-existent)
    if let Some(ref provider_filter) = params.provider {
        let in_config = state
            .config
            .providers
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(provider_filter));
        if !in_config {
            let in_db = storage::stats::provider_exists(pool, provider_filter).await?;
            if !in_db {
                return Err(Error::NotFound(format!(
                    "Provider '{}' not found",
                    provider_filter
                )));
            }
        }
    }

    // Query aggregate stats
    let row = storage::stats::query_aggregate(
        pool,
        &since_str,
        &until_str,
        params.provider.as_deref(),
    )
    .await?;

    // Per-provider breakdown: configured providers always appear (zeroed
    // when they served nothing in range); providers only present in old
    // rows are appended after.
    let provider_rows = storage::stats::query_grouped_by_provider(
        pool,
        &since_str,
        &until_str,
        params.provider.as_deref(),
    )
    .await?;

    let mut sql_providers: std::collections::HashMap<String, &storage::stats::ProviderRow> =
        std::collections::HashMap::new();
    for pr in &provider_rows {
        sql_providers.insert(pr.provider.to_lowercase(), pr);
    }

    let mut providers_map = serde_json::Map::new();
    for p in &state.config.providers {
        if let Some(ref filter) = params.provider {
            if !p.name.eq_ignore_ascii_case(filter) {
                continue;
            }
        }
        let value = if let Some(pr) = sql_providers.remove(&p.name.to_lowercase()) {
            provider_row_to_json(pr)
        } else {
            zeroed_provider_json()
        };
        providers_map.insert(p.name.clone(), value);
    }
    for (_, pr) in sql_providers {
        providers_map.insert(pr.provider.clone(), provider_row_to_json(pr));
    }

    // Determine empty state
    let (empty, message) = if row.total_requests == 0 {
        (
            Some(true),
            Some("No requests found in the specified time range".to_string()),
        )
    } else {
        (None, None)
    };

    let response = StatsResponse {
        since: since_dt.to_rfc3339(),
        until: until_dt.to_rfc3339(),
        empty,
        message,
        counts: CountsSection {
            total: row.total_requests,
            success: row.success_count,
            error: row.error_count,
        },
        tokens: TokensSection {
            total_input_tokens: row.total_input_tokens as i64,
            total_output_tokens: row.total_output_tokens as i64,
        },
        performance: PerformanceSection {
            avg_latency_ms: row.avg_latency_ms,
            avg_attempts: row.avg_attempts,
        },
        providers: serde_json::Value::Object(providers_map),
    };

    Ok(Json(response))
}

/// Convert a ProviderRow to JSON for the providers map.
fn provider_row_to_json(pr: &storage::stats::ProviderRow) -> serde_json::Value {
    serde_json::json!({
        "counts": {
            "total": pr.total_requests,
            "success": pr.success_count,
            "error": pr.error_count,
        },
        "tokens": {
            "total_input_tokens": pr.total_input_tokens as i64,
            "total_output_tokens": pr.total_output_tokens as i64,
        },
        "performance": {
            "avg_latency_ms": pr.avg_latency_ms,
            "avg_attempts": pr.avg_attempts,
        }
    })
}

/// Return zeroed stats JSON for a configured provider with no traffic.
fn zeroed_provider_json() -> serde_json::Value {
    serde_json::json!({
        "counts": {
            "total": 0,
            "success": 0,
            "error": 0,
        },
        "tokens": {
            "total_input_tokens": 0,
            "total_output_tokens": 0,
        },
        "performance": {
            "avg_latency_ms": 0.0,
            "avg_attempts": 0.0,
        }
    })
}
