//! Request logging data types and database operations.

use sqlx::SqlitePool;

/// A completed request log entry ready for database insertion.
///
/// All fields are owned types to satisfy `tokio::spawn` `'static` requirement.
/// Only the prompt length is recorded; prompt and completion text never reach
/// the database.
pub struct RequestLog {
    pub correlation_id: String,
    /// RFC 3339 UTC timestamp; stored as TEXT so range filters compare
    /// lexicographically.
    pub timestamp: String,
    /// Provider that served the request; `None` when every provider was
    /// exhausted.
    pub provider: Option<String>,
    /// Attempts across all providers, including the successful one.
    pub attempts: i64,
    pub prompt_chars: i64,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub latency_ms: i64,
    pub success: bool,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl RequestLog {
    /// Insert this log entry into the database.
    pub async fn insert(&self, pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO requests (
                correlation_id, timestamp, provider, attempts, prompt_chars,
                input_tokens, output_tokens,
                latency_ms, success, error_kind, error_message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&self.correlation_id)
        .bind(&self.timestamp)
        .bind(&self.provider)
        .bind(self.attempts)
        .bind(self.prompt_chars)
        .bind(self.input_tokens.map(|v| v as i64))
        .bind(self.output_tokens.map(|v| v as i64))
        .bind(self.latency_ms)
        .bind(self.success)
        .bind(self.error_kind.as_deref())
        .bind(self.error_message.as_deref())
        .execute(pool)
        .await?;
        Ok(())
    }
}

/// Spawn a fire-and-forget database write.
///
/// If the write fails, a warning is logged but the error is not propagated.
pub fn spawn_log_write(pool: &SqlitePool, log: RequestLog) {
    let pool = pool.clone();
    tokio::spawn(async move {
        if let Err(e) = log.insert(&pool).await {
            tracing::warn!(
                correlation_id = %log.correlation_id,
                error = %e,
                "Failed to write request log to database"
            );
        }
    });
}
