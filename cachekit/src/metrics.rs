//! Metrics declaration and recording (module N2: observability facade).
//!
//! Mirrors the teacher's pattern of lazily-registered, `metrics`-crate-backed counters
//! and histograms behind a `metrics` feature flag; with `CacheContext`/`CacheStatus` gone
//! (module L is no longer an FSM tracking per-layer read/write counts in a shared context),
//! this records directly off [`crate::invocation::Outcome`] and caller-supplied operation
//! labels instead.

#[cfg(feature = "metrics")]
use crate::invocation::Outcome;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Track number of cache hit events.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "cache_hit_count",
            "Total number of cache hit events by method."
        );
        "cache_hit_count"
    };
    /// Track number of cache miss events.
    pub static ref CACHE_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "cache_miss_count",
            "Total number of cache miss events by method."
        );
        "cache_miss_count"
    };
    /// Track number of cache stale events.
    pub static ref CACHE_STALE_COUNTER: &'static str = {
        metrics::describe_counter!(
            "cache_stale_count",
            "Total number of cache stale events by method."
        );
        "cache_stale_count"
    };
    /// Track number of coalesced (dogpile-avoided) requests.
    pub static ref CACHE_COALESCED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "cache_coalesced_count",
            "Total number of requests that waited on an in-flight upstream call instead of making their own."
        );
        "cache_coalesced_count"
    };

    // Offload manager metrics

    /// Track number of offload tasks spawned.
    pub static ref OFFLOAD_TASKS_SPAWNED: &'static str = {
        metrics::describe_counter!(
            "offload_tasks_spawned_total",
            "Total number of offload tasks spawned."
        );
        "offload_tasks_spawned_total"
    };
    /// Track number of offload tasks completed successfully.
    pub static ref OFFLOAD_TASKS_COMPLETED: &'static str = {
        metrics::describe_counter!(
            "offload_tasks_completed_total",
            "Total number of offload tasks completed successfully."
        );
        "offload_tasks_completed_total"
    };
    /// Track number of offload tasks that timed out.
    pub static ref OFFLOAD_TASKS_TIMEOUT: &'static str = {
        metrics::describe_counter!(
            "offload_tasks_timeout_total",
            "Total number of offload tasks that timed out."
        );
        "offload_tasks_timeout_total"
    };
    /// Track number of offload tasks deduplicated (skipped).
    pub static ref OFFLOAD_TASKS_DEDUPLICATED: &'static str = {
        metrics::describe_counter!(
            "offload_tasks_deduplicated_total",
            "Total number of offload tasks deduplicated (skipped because already in flight)."
        );
        "offload_tasks_deduplicated_total"
    };
    /// Gauge of currently active offload tasks.
    pub static ref OFFLOAD_TASKS_ACTIVE: &'static str = {
        metrics::describe_gauge!(
            "offload_tasks_active",
            "Number of currently active offload tasks."
        );
        "offload_tasks_active"
    };
    /// Histogram of offload task duration.
    pub static ref OFFLOAD_TASK_DURATION: &'static str = {
        metrics::describe_histogram!(
            "offload_task_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of offload tasks in seconds."
        );
        "offload_task_duration_seconds"
    };
}

/// Records one invocation outcome under `method`'s label.
///
/// No-op (and eliminated by the compiler) when the `metrics` feature is disabled.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_outcome(method: &str, outcome: Outcome) {
    match outcome {
        Outcome::Hit => {
            metrics::counter!(*CACHE_HIT_COUNTER, "method" => method.to_string()).increment(1);
        }
        Outcome::Stale => {
            metrics::counter!(*CACHE_STALE_COUNTER, "method" => method.to_string()).increment(1);
        }
        Outcome::Miss => {
            metrics::counter!(*CACHE_MISS_COUNTER, "method" => method.to_string()).increment(1);
        }
        Outcome::Coalesced => {
            metrics::counter!(*CACHE_COALESCED_COUNTER, "method" => method.to_string()).increment(1);
        }
    }
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_outcome(_method: &str, _outcome: crate::invocation::Outcome) {}
