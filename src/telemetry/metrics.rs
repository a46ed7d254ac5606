use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::Error;
use crate::types::Result;

/// Metrics collector
pub struct ApproverMetrics {
    /// Registry
    registry: Registry,
    /// Recorded decisions by outcome and reason
    decisions: IntCounterVec,
    /// Failed reconciliations that will be retried
    sync_errors: IntCounter,
    /// Items given up on after exhausting retries
    dropped: IntCounter,
    /// Keys waiting in the work queue
    queue_depth: IntGauge,
    /// Time spent per reconciliation
    sync_duration: Histogram,
}

impl ApproverMetrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let decisions = IntCounterVec::new(
            Opts::new("csr_approver_decisions_total", "Decisions recorded on certificate signing requests"),
            &["decision", "reason"],
        )?;
        let sync_errors = IntCounter::new(
            "csr_approver_sync_errors_total",
            "Reconciliations that failed and were requeued",
        )?;
        let dropped = IntCounter::new(
            "csr_approver_dropped_total",
            "Requests dropped after exhausting retries",
        )?;
        let queue_depth = IntGauge::new("csr_approver_queue_depth", "Keys waiting in the work queue")?;
        let sync_duration = Histogram::with_opts(HistogramOpts::new(
            "csr_approver_sync_duration_seconds",
            "Time spent reconciling a single request",
        ))?;

        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(sync_errors.clone()))?;
        registry.register(Box::new(dropped.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(sync_duration.clone()))?;

        Ok(Self {
            registry,
            decisions,
            sync_errors,
            dropped,
            queue_depth,
            sync_duration,
        })
    }

    pub fn inc_decision(&self, decision: &str, reason: &str) {
        self.decisions.with_label_values(&[decision, reason]).inc();
    }

    pub fn decision_count(&self, decision: &str, reason: &str) -> u64 {
        self.decisions.with_label_values(&[decision, reason]).get()
    }

    pub fn inc_sync_errors(&self) {
        self.sync_errors.inc();
    }

    pub fn sync_errors(&self) -> u64 {
        self.sync_errors.get()
    }

    pub fn inc_dropped(&self) {
        self.dropped.inc();
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as i64);
    }

    pub fn observe_sync(&self, seconds: f64) {
        self.sync_duration.observe(seconds);
    }

    /// Render every metric in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("Metrics are not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render() {
        let metrics = ApproverMetrics::new().unwrap();
        metrics.inc_decision("Approved", "Authorized by approval profile");
        metrics.inc_decision("Approved", "Authorized by approval profile");
        metrics.inc_sync_errors();
        metrics.set_queue_depth(3);

        assert_eq!(metrics.decision_count("Approved", "Authorized by approval profile"), 2);
        assert_eq!(metrics.sync_errors(), 1);

        let text = metrics.render().unwrap();
        assert!(text.contains("csr_approver_decisions_total"));
        assert!(text.contains("csr_approver_queue_depth 3"));
    }

    #[test]
    fn test_collectors_are_independent() {
        let first = ApproverMetrics::new().unwrap();
        let second = ApproverMetrics::new().unwrap();
        first.inc_dropped();

        assert_eq!(first.dropped(), 1);
        assert_eq!(second.dropped(), 0);
    }
}
