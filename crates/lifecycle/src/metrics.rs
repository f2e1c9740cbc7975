//! Prometheus metrics for lifecycle operations.

use prometheus::{self, Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Cleanup metrics
pub static ASSETS_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "casa_assets_deleted_total",
        "Total number of assets removed from storage",
    )
    .expect("metric creation failed")
});

pub static DELETE_BATCH_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "casa_delete_batch_failures_total",
        "Total number of delete batches rejected by the store",
    )
    .expect("metric creation failed")
});

pub static VERIFY_REMAINING: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "casa_verify_remaining_total",
        "Total number of objects found by verification after cleanup",
    )
    .expect("metric creation failed")
});

// Migration metrics
pub static ASSETS_MIGRATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "casa_assets_migrated_total",
        "Total number of inline images moved into storage",
    )
    .expect("metric creation failed")
});

pub static MIGRATION_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "casa_migration_errors_total",
        "Total number of per-item migration failures",
    )
    .expect("metric creation failed")
});

// Sync metrics
pub static SYNC_COMPENSATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "casa_sync_compensations_total",
            "Compensating deletes after a failed record write, by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static SYNC_WARNINGS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "casa_sync_warnings_total",
            "Best-effort sync steps that failed, by step",
        ),
        &["step"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Safe to call more than once.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(ASSETS_DELETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DELETE_BATCH_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(VERIFY_REMAINING.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ASSETS_MIGRATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(MIGRATION_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SYNC_COMPENSATIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SYNC_WARNINGS.clone()))
            .expect("metric registration failed");
    });
}

/// Render the registry in the Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Helper to record a failed best-effort sync step.
pub fn record_sync_warning(step: &str) {
    SYNC_WARNINGS.with_label_values(&[step]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        register_metrics();
        register_metrics();
        ASSETS_DELETED.inc_by(0);
        let text = render().unwrap();
        assert!(text.contains("casa_assets_deleted_total"));
    }
}
