//! Aggregate statistics queries for the stats endpoint.

use sqlx::SqlitePool;

/// Aggregate statistics for a time range.
#[derive(sqlx::FromRow)]
pub struct AggregateRow {
    pub total_requests: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub avg_latency_ms: f64,
    pub avg_attempts: f64,
    pub total_input_tokens: f64,
    pub total_output_tokens: f64,
}

/// Per-provider statistics for a time range.
#[derive(sqlx::FromRow)]
pub struct ProviderRow {
    pub provider: String,
    pub total_requests: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub avg_latency_ms: f64,
    pub avg_attempts: f64,
    pub total_input_tokens: f64,
    pub total_output_tokens: f64,
}

/// Query aggregate statistics for a time range with an optional provider filter.
///
/// Uses `TOTAL()` for nullable numeric columns (returns 0.0 instead of NULL)
/// and `COALESCE(AVG(), 0)` to ensure non-null results on empty ranges.
pub async fn query_aggregate(
    pool: &SqlitePool,
    since: &str,
    until: &str,
    provider: Option<&str>,
) -> Result<AggregateRow, sqlx::Error> {
    let mut sql = String::from(
        "SELECT \
         COUNT(*) as total_requests, \
         COUNT(CASE WHEN success = 1 THEN 1 END) as success_count, \
         COUNT(CASE WHEN success = 0 THEN 1 END) as error_count, \
         COALESCE(AVG(latency_ms), 0.0) as avg_latency_ms, \
         COALESCE(AVG(attempts), 0.0) as avg_attempts, \
         TOTAL(input_tokens) as total_input_tokens, \
         TOTAL(output_tokens) as total_output_tokens \
         FROM requests WHERE timestamp >= ? AND timestamp <= ?",
    );

    if provider.is_some() {
        sql.push_str(" AND LOWER(provider) = LOWER(?)");
    }

    let mut query = sqlx::query_as::<_, AggregateRow>(&sql)
        .bind(since)
        .bind(until);

    if let Some(p) = provider {
        query = query.bind(p);
    }

    query.fetch_one(pool).await
}

/// Query per-provider statistics for a time range.
///
/// Returns one row per provider that served at least one request. Rows where
/// every provider was exhausted have a NULL provider and are excluded here;
/// they still count in the aggregate's `error_count`.
pub async fn query_grouped_by_provider(
    pool: &SqlitePool,
    since: &str,
    until: &str,
    provider: Option<&str>,
) -> Result<Vec<ProviderRow>, sqlx::Error> {
    let mut sql = String::from(
        "SELECT \
         provider, \
         COUNT(*) as total_requests, \
         COUNT(CASE WHEN success = 1 THEN 1 END) as success_count, \
         COUNT(CASE WHEN success = 0 THEN 1 END) as error_count, \
         COALESCE(AVG(latency_ms), 0.0) as avg_latency_ms, \
         COALESCE(AVG(attempts), 0.0) as avg_attempts, \
         TOTAL(input_tokens) as total_input_tokens, \
         TOTAL(output_tokens) as total_output_tokens \
         FROM requests WHERE timestamp >= ? AND timestamp <= ? \
         AND provider IS NOT NULL",
    );

    if provider.is_some() {
        sql.push_str(" AND LOWER(provider) = LOWER(?)");
    }

    sql.push_str(" GROUP BY provider ORDER BY provider");

    let mut query = sqlx::query_as::<_, ProviderRow>(&sql)
        .bind(since)
        .bind(until);

    if let Some(p) = provider {
        query = query.bind(p);
    }

    query.fetch_all(pool).await
}

/// Check whether a provider name appears in the requests table.
///
/// Returns true if at least one row matches (case-insensitive).
pub async fn provider_exists(pool: &SqlitePool, name: &str) -> Result<bool, sqlx::Error> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) as cnt FROM requests WHERE LOWER(provider) = LOWER(?)")
            .bind(name)
            .fetch_one(pool)
            .await?;

    Ok(count > 0)
}
