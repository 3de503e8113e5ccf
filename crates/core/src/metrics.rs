//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Task queue (enqueued, claimed, completed, failed)
//! - Conversion pipeline (durations, artifact sizes)
//! - Rate limiter (rejections)
//! - Background loops (dispatcher, reaper)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Task Queue Metrics
// =============================================================================

/// Tasks enqueued total.
pub static TASKS_ENQUEUED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "nocturne_tasks_enqueued_total",
        "Total conversion tasks enqueued",
    )
    .unwrap()
});

/// Tasks completed total.
pub static TASKS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "nocturne_tasks_completed_total",
        "Total conversion tasks completed successfully",
    )
    .unwrap()
});

/// Tasks failed total by error code.
pub static TASKS_FAILED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "nocturne_tasks_failed_total",
            "Total conversion tasks failed",
        ),
        &["code"],
    )
    .unwrap()
});

/// Tasks claimed by the dispatcher.
pub static TASKS_CLAIMED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "nocturne_tasks_claimed_total",
        "Total tasks claimed by the dispatcher",
    )
    .unwrap()
});

// =============================================================================
// Conversion Metrics
// =============================================================================

/// Conversion duration in seconds.
pub static CONVERSION_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "nocturne_conversion_duration_seconds",
            "Duration of audio conversions",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
    )
    .unwrap()
});

/// Conversion output size in bytes.
pub static ARTIFACT_SIZE: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "nocturne_artifact_size_bytes",
            "Size of converted audio artifacts",
        )
        .buckets(vec![
            64_000.0,
            256_000.0,
            1_000_000.0,
            4_000_000.0,
            10_000_000.0,
            20_000_000.0,
        ]),
    )
    .unwrap()
});

// =============================================================================
// Rate Limiter Metrics
// =============================================================================

/// Requests rejected by the rate limiter, by limit class.
pub static RATE_LIMITED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "nocturne_rate_limited_total",
            "Total requests rejected by the rate limiter",
        ),
        &["key"],
    )
    .unwrap()
});

// =============================================================================
// Background Loop Metrics
// =============================================================================

/// Errors swallowed by background loops, by loop name.
pub static LOOP_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "nocturne_loop_errors_total",
            "Errors reported by background loops",
        ),
        &["loop"],
    )
    .unwrap()
});

/// Records deleted by the reaper, by kind.
pub static REAPER_DELETED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "nocturne_reaper_deleted_total",
            "Records reclaimed by the reaper",
        ),
        &["kind"], // "task", "blob", "bucket", "orphan_blob", "orphan_chunk"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Task queue
        Box::new(TASKS_ENQUEUED.clone()),
        Box::new(TASKS_COMPLETED.clone()),
        Box::new(TASKS_FAILED.clone()),
        Box::new(TASKS_CLAIMED.clone()),
        // Conversion
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(ARTIFACT_SIZE.clone()),
        // Rate limiter
        Box::new(RATE_LIMITED.clone()),
        // Background loops
        Box::new(LOOP_ERRORS.clone()),
        Box::new(REAPER_DELETED.clone()),
    ]
}
