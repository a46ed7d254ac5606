use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::controller::informer::EventHandler;
use crate::csr::{parse_request, ConditionType, CsrCondition};
use crate::error::Error;
use crate::policy::{ProfileSet, RequestAttributes};
use crate::queue::WorkQueue;
use crate::store::RequestStore;
use crate::telemetry::ApproverMetrics;
use crate::types::Result;

/// Reason recorded when a profile allowed the request
pub const REASON_AUTHORIZED: &str = "Authorized by approval profile";
/// Reason recorded when no profile allowed the request
pub const REASON_NOT_ALLOWED: &str = "Not allowed by any approval profile";
/// Reason recorded when the PKCS#10 payload could not be parsed
pub const REASON_MALFORMED: &str = "Badly formed request";

/// Controller options
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Name used in decision messages
    pub component_name: String,
    /// Requeues before an item is dropped (0 = retry forever)
    pub max_retries: u32,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            component_name: "csr-approver".to_string(),
            max_retries: 10,
        }
    }
}

/// What a successful reconciliation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The request no longer exists
    Missing,
    /// A decision was already recorded
    AlreadyDecided(ConditionType),
    /// Approved under the named profile
    Approved { profile: String },
    /// Denied for the given reason
    Denied { reason: &'static str },
}

/// Approves or denies certificate signing requests against the configured
/// approval profiles.
pub struct CsrApproverController {
    store: Arc<dyn RequestStore>,
    /// Requests that need to be checked
    queue: Arc<dyn WorkQueue>,
    profiles: Arc<ProfileSet>,
    options: ControllerOptions,
    metrics: Arc<ApproverMetrics>,
}

impl CsrApproverController {
    pub fn new(
        profiles: Arc<ProfileSet>,
        store: Arc<dyn RequestStore>,
        queue: Arc<dyn WorkQueue>,
        metrics: Arc<ApproverMetrics>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            store,
            queue,
            profiles,
            options,
            metrics,
        }
    }

    /// Queue a request for evaluation
    pub fn enqueue(&self, name: &str) {
        debug!("Queueing request {}", name);
        self.queue.add(name);
        self.metrics.set_queue_depth(self.queue.len());
    }

    /// Callback for the event source
    pub fn event_handler(self: &Arc<Self>) -> EventHandler {
        let controller = Arc::clone(self);
        Arc::new(move |name: &str| controller.enqueue(name))
    }

    /// Run `workers` workers until `shutdown` turns true, then let in-flight
    /// items finish.
    pub async fn run(self: Arc<Self>, workers: usize, mut shutdown: watch::Receiver<bool>) {
        info!("Starting {} workers", workers);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let controller = Arc::clone(&self);
            handles.push(tokio::spawn(controller.supervise(id)));
        }

        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        info!("Shutting down");
        self.queue.shut_down();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task failed: {}", e);
            }
        }
    }

    /// Keep a worker running, restarting it if it panics
    async fn supervise(self: Arc<Self>, id: usize) {
        loop {
            let controller = Arc::clone(&self);
            match tokio::spawn(async move { controller.worker().await }).await {
                Ok(()) => return,
                Err(e) if self.queue.is_shutting_down() => {
                    error!(worker = id, "Worker failed during shutdown: {}", e);
                    return;
                }
                Err(e) => {
                    error!(worker = id, "Worker failed, restarting: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Process items until the queue shuts down
    pub async fn worker(&self) {
        while self.process_next_item().await {}
    }

    /// Take one key from the queue and reconcile it. Returns false once the
    /// queue has shut down.
    pub async fn process_next_item(&self) -> bool {
        let key = match self.queue.get().await {
            Some(key) => key,
            None => return false,
        };
        let in_flight = InFlight {
            queue: self.queue.as_ref(),
            key,
        };
        let key = in_flight.key.as_str();

        let started = Instant::now();
        match self.sync(key).await {
            Ok(outcome) => {
                debug!("Synced {}: {:?}", key, outcome);
                self.queue.forget(key);
            }
            Err(Error::InvalidKey(e)) => {
                error!("Dropping unusable queue key: {}", e);
                self.queue.forget(key);
            }
            Err(e) => self.handle_error(key, e),
        }
        self.metrics.observe_sync(started.elapsed().as_secs_f64());

        drop(in_flight);
        self.metrics.set_queue_depth(self.queue.len());
        true
    }

    fn handle_error(&self, key: &str, err: Error) {
        let requeues = self.queue.num_requeues(key);
        if self.options.max_retries > 0 && requeues >= self.options.max_retries {
            error!(key = %key, requeues, error = %err, "Dropping request after exhausting retries");
            self.metrics.inc_dropped();
            self.queue.forget(key);
            return;
        }

        warn!(key = %key, requeues, error = %err, "Error syncing request, it will be retried");
        self.metrics.inc_sync_errors();
        self.queue.add_rate_limited(key);
    }

    /// Reconcile a single request
    pub async fn sync(&self, key: &str) -> Result<SyncOutcome> {
        let name = split_key(key)?;

        let csr = match self.store.get(name).await? {
            Some(csr) => csr,
            None => {
                debug!("Request {} no longer exists", name);
                return Ok(SyncOutcome::Missing);
            }
        };

        debug!("Checking request {}, spec: {:?}", name, csr.spec.usages);

        if let Some(decision) = csr.decision() {
            debug!("Request {} already handled: {}", name, decision);
            return Ok(SyncOutcome::AlreadyDecided(decision));
        }

        let parsed = match parse_request(&csr.spec.request) {
            Ok(parsed) => parsed,
            Err(e) => {
                info!("Request {} failed to parse: {}", name, e);
                self.record(name, ConditionType::Denied, REASON_MALFORMED).await?;
                return Ok(SyncOutcome::Denied { reason: REASON_MALFORMED });
            }
        };

        let attrs = RequestAttributes::from(&csr.spec);
        match self.profiles.matching_profile(&attrs, &parsed) {
            Some(profile) => {
                info!("Request {} approved by profile {}", name, profile);
                self.record(name, ConditionType::Approved, REASON_AUTHORIZED).await?;
                Ok(SyncOutcome::Approved {
                    profile: profile.to_string(),
                })
            }
            None => {
                info!("Request {} denied", name);
                self.record(name, ConditionType::Denied, REASON_NOT_ALLOWED).await?;
                Ok(SyncOutcome::Denied {
                    reason: REASON_NOT_ALLOWED,
                })
            }
        }
    }

    async fn record(&self, name: &str, condition_type: ConditionType, reason: &str) -> Result<()> {
        let verb = match condition_type {
            ConditionType::Approved => "Approved",
            _ => "Denied",
        };
        let message = format!("{} by {}", verb, self.options.component_name);

        self.store
            .update_status(
                name,
                CsrCondition {
                    condition_type,
                    reason: reason.to_string(),
                    message,
                    last_update_time: Utc::now(),
                },
            )
            .await?;

        self.metrics.inc_decision(verb, reason);
        Ok(())
    }
}

/// Marks a key done when dropped, including while a panicking worker unwinds
struct InFlight<'a> {
    queue: &'a dyn WorkQueue,
    key: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.queue.done(&self.key);
    }
}

/// Extract the object name from a `name` or `namespace/name` key
pub fn split_key(key: &str) -> Result<&str> {
    let mut parts = key.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), None, None) if !name.is_empty() => Ok(name),
        (Some(_), Some(name), None) if !name.is_empty() => Ok(name),
        _ => Err(Error::InvalidKey(format!("unexpected key format: {:?}", key))),
    }
}
