//! The failover loop: bounded retries per provider, priority-order
//! switching, first success wins.
//!
//! The algorithm is generic over what a "call" is so it can be driven by
//! stub closures in tests; [`FailoverRouter`] binds it to the real provider
//! clients. Per request the state is purely local -- nothing is shared
//! across requests and nothing persists between them, so concurrent
//! requests never coordinate.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::FailoverConfig;
use crate::provider::types::{GenerationRequest, TokenUsage};
use crate::provider::{ProviderClient, ProviderError};

/// Process-wide failover policy, fixed at startup.
#[derive(Debug, Clone)]
pub struct FailoverPolicy {
    /// Total attempts per provider before moving on. Must be >= 1
    /// (config validation enforces this).
    pub max_retries: u32,
    /// Flat delay between consecutive attempts on the same provider.
    /// Switching providers inserts no delay.
    pub retry_delay: Duration,
    /// When false, only the primary provider is ever attempted.
    pub failover_enabled: bool,
    /// Default per-attempt timeout; a request's `timeout_ms` overrides it.
    pub attempt_timeout: Duration,
}

impl FailoverPolicy {
    pub fn from_config(config: &FailoverConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            failover_enabled: config.enabled,
            attempt_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self::from_config(&FailoverConfig::default())
    }
}

/// Lightweight candidate handle for the failover loop.
///
/// Decoupled from `ProviderClient` so the loop can be exercised with stub
/// closures -- tests inject failures without any network machinery.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    /// Position in the priority order (0 = primary).
    pub index: usize,
}

/// Record of a single failed attempt.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub provider: String,
    /// 1-based attempt number within that provider
    pub attempt: u32,
    pub error: ProviderError,
}

/// Per-provider summary derived from the attempt history.
#[derive(Debug, Clone)]
pub struct ProviderFailure<'a> {
    pub provider: &'a str,
    pub attempts: u32,
    pub last_error: &'a ProviderError,
}

/// Terminal failure: every provider under the policy was exhausted.
///
/// Carries the full attempt history -- no error is swallowed. The
/// per-provider view is derived on demand.
#[derive(Debug, Clone)]
pub struct ExhaustionReport {
    /// Every failed attempt in the order it happened. Never empty.
    pub attempts: Vec<AttemptRecord>,
}

impl ExhaustionReport {
    pub fn total_attempts(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// One entry per provider attempted, preserving first-attempt order.
    pub fn provider_failures(&self) -> Vec<ProviderFailure<'_>> {
        let mut failures: Vec<ProviderFailure<'_>> = Vec::new();
        for record in &self.attempts {
            match failures
                .iter_mut()
                .find(|f| f.provider == record.provider)
            {
                Some(entry) => {
                    entry.attempts += 1;
                    entry.last_error = &record.error;
                }
                None => failures.push(ProviderFailure {
                    provider: &record.provider,
                    attempts: 1,
                    last_error: &record.error,
                }),
            }
        }
        failures
    }
}

impl std::fmt::Display for ExhaustionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "All providers exhausted after {} attempt(s)",
            self.attempts.len()
        )?;
        for failure in self.provider_failures() {
            write!(
                f,
                "; {}: {} attempt(s), last error: {}",
                failure.provider, failure.attempts, failure.last_error
            )?;
        }
        Ok(())
    }
}

/// A successful outcome together with its attribution.
#[derive(Debug)]
pub struct Served<T> {
    pub value: T,
    /// Name of the provider that produced the value
    pub provider: String,
    /// Attempts across all providers, including the successful one
    pub total_attempts: u32,
}

/// Try candidates in priority order until one call succeeds.
///
/// Per candidate: up to `policy.max_retries` attempts, each bounded by
/// `attempt_timeout`, with `policy.retry_delay` slept between consecutive
/// attempts (never before the first, never across a provider switch). A
/// transient failure consumes budget and retries; a fatal failure abandons
/// the provider immediately. With failover disabled only the first
/// candidate is attempted.
///
/// The future spawns nothing: dropping it drops the in-flight call and no
/// further attempts happen.
pub async fn run_failover<T, F, Fut>(
    candidates: &[Candidate],
    policy: &FailoverPolicy,
    attempt_timeout: Duration,
    call: F,
) -> Result<Served<T>, ExhaustionReport>
where
    F: Fn(&Candidate) -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    assert!(
        !candidates.is_empty(),
        "run_failover requires at least one candidate"
    );
    assert!(
        policy.max_retries >= 1,
        "run_failover requires max_retries >= 1"
    );

    let order = if policy.failover_enabled {
        candidates
    } else {
        &candidates[..1]
    };

    let mut history: Vec<AttemptRecord> = Vec::new();
    let mut total_attempts = 0u32;

    for candidate in order {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            total_attempts += 1;

            let outcome = match tokio::time::timeout(attempt_timeout, call(candidate)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(attempt_timeout)),
            };

            let err = match outcome {
                Ok(value) => {
                    return Ok(Served {
                        value,
                        provider: candidate.name.clone(),
                        total_attempts,
                    });
                }
                Err(err) => err,
            };

            tracing::warn!(
                provider = %candidate.name,
                attempt,
                max_attempts = policy.max_retries,
                error = %err,
                "Provider attempt failed"
            );

            let transient = err.is_transient();
            history.push(AttemptRecord {
                provider: candidate.name.clone(),
                attempt,
                error: err,
            });

            // Fatal errors abandon this provider without burning the rest
            // of its budget; transient errors retry until the budget runs
            // out. Either way the next provider starts fresh.
            if !transient || attempt >= policy.max_retries {
                break;
            }

            tokio::time::sleep(policy.retry_delay).await;
        }
    }

    Err(ExhaustionReport { attempts: history })
}

/// Failure modes of [`FailoverRouter::generate`].
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// The request was malformed; no provider was contacted.
    #[error("Invalid request: {0}")]
    Invalid(String),

    /// Every provider under the policy was exhausted.
    #[error("{0}")]
    Exhausted(ExhaustionReport),
}

/// The uniform response callers get, with provider attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Generated text (may legitimately be empty)
    pub text: String,
    /// Which provider produced it
    pub provider: String,
    /// Attempts across all providers, including the successful one
    pub total_attempts: u32,
    /// Wall-clock latency of the whole routed call
    pub latency_ms: u64,
    /// Token accounting, when the vendor reported it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// The failover router: an immutable provider set in priority order plus
/// the policy. Holds no per-request state, so one instance serves any
/// number of concurrent requests without locks.
#[derive(Debug, Clone)]
pub struct FailoverRouter {
    providers: Vec<ProviderClient>,
    candidates: Vec<Candidate>,
    policy: FailoverPolicy,
}

impl FailoverRouter {
    /// Build a router over providers in priority order (first = primary).
    ///
    /// The provider list must be non-empty; config validation guarantees
    /// this for configured routers.
    pub fn new(providers: Vec<ProviderClient>, policy: FailoverPolicy) -> Self {
        assert!(
            !providers.is_empty(),
            "FailoverRouter requires at least one provider"
        );
        let candidates = providers
            .iter()
            .enumerate()
            .map(|(index, p)| Candidate {
                name: p.name().to_string(),
                index,
            })
            .collect();
        Self {
            providers,
            candidates,
            policy,
        }
    }

    pub fn policy(&self) -> &FailoverPolicy {
        &self.policy
    }

    pub fn providers(&self) -> &[ProviderClient] {
        &self.providers
    }

    /// Per-attempt timeout for a request: its own override, or the policy
    /// default.
    fn effective_timeout(&self, request: &GenerationRequest) -> Duration {
        request
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.policy.attempt_timeout)
    }

    /// Route one generation request.
    ///
    /// Validation happens before any provider is contacted; an empty
    /// prompt never causes a network call.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, RouteError> {
        request.validate().map_err(RouteError::Invalid)?;

        let attempt_timeout = self.effective_timeout(request);
        let started = std::time::Instant::now();

        let outcome = run_failover(&self.candidates, &self.policy, attempt_timeout, |candidate| {
            let provider = &self.providers[candidate.index];
            async move { provider.generate(request).await }
        })
        .await;

        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(served) => {
                tracing::info!(
                    provider = %served.provider,
                    attempts = served.total_attempts,
                    latency_ms,
                    "Generation served"
                );
                Ok(GenerationResult {
                    text: served.value.text,
                    provider: served.provider,
                    total_attempts: served.total_attempts,
                    latency_ms,
                    usage: served.value.usage,
                })
            }
            Err(report) => {
                tracing::error!(
                    attempts = report.total_attempts(),
                    latency_ms,
                    "All providers exhausted"
                );
                Err(RouteError::Exhausted(report))
            }
        }
    }
}
