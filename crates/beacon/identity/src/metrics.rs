//! Prometheus metrics for identity resolution.
//!
//! Degraded resolutions are invisible to callers; these counters are the
//! side channel that makes a failing identity store observable.

use crate::resolver::Resolution;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};
use std::time::Duration;

/// Metrics for visitor identity resolution
pub struct IdentityMetrics {
    /// Resolutions by outcome and matching strategy
    pub resolutions_total: IntCounterVec,

    /// Store failures by operation
    pub store_failures_total: IntCounterVec,

    /// Time spent resolving, store calls included
    pub resolution_duration_seconds: Histogram,
}

impl IdentityMetrics {
    /// Create and register identity metrics
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let resolutions_total = IntCounterVec::new(
            Opts::new(
                "beacon_visitor_resolutions_total",
                "Visitor identity resolutions",
            ),
            &["outcome", "strategy"],
        )?;
        registry.register(Box::new(resolutions_total.clone()))?;

        let store_failures_total = IntCounterVec::new(
            Opts::new(
                "beacon_visitor_store_failures_total",
                "Identity store failures absorbed by the resolver",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(store_failures_total.clone()))?;

        let resolution_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "beacon_visitor_resolution_duration_seconds",
                "Visitor identity resolution duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        )?;
        registry.register(Box::new(resolution_duration_seconds.clone()))?;

        Ok(Self {
            resolutions_total,
            store_failures_total,
            resolution_duration_seconds,
        })
    }

    /// Record one resolution outcome
    pub fn record(&self, resolution: &Resolution, elapsed: Duration) {
        let strategy = match resolution {
            Resolution::Resolved(resolved) => resolved.matched_by.map_or("none", |s| s.as_str()),
            _ => "none",
        };
        self.resolutions_total
            .with_label_values(&[resolution.outcome(), strategy])
            .inc();

        if let Resolution::Degraded(reason) = resolution {
            self.store_failures_total
                .with_label_values(&[reason.operation.as_str()])
                .inc();
        }

        if !matches!(resolution, Resolution::Skipped) {
            self.resolution_duration_seconds
                .observe(elapsed.as_secs_f64());
        }
    }
}
