//! Failover routing over the configured provider set.
//!
//! Providers are tried in config order (first entry = primary). Each gets a
//! bounded retry budget for transient failures; fatal failures skip straight
//! to the next provider. The first success wins, and running out of
//! providers yields an [`ExhaustionReport`] naming every provider attempted
//! and what went wrong on each.

mod failover;

pub use failover::{
    run_failover, AttemptRecord, Candidate, ExhaustionReport, FailoverPolicy, FailoverRouter,
    GenerationResult, ProviderFailure, RouteError, Served,
};
