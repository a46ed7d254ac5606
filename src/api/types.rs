use std::sync::Arc;

use crate::controller::PollingInformer;
use crate::telemetry::ApproverMetrics;

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct ApiState {
    /// Metrics collector
    pub metrics: Arc<ApproverMetrics>,
    /// Readiness follows the informer's initial sync
    pub informer: Arc<PollingInformer>,
}
