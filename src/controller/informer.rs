use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::csr::CertificateSigningRequest;
use crate::store::RequestStore;
use crate::types::Result;

/// Callback invoked with the name of a request that was added or changed
pub type EventHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Polls the request store and reports additions and updates.
///
/// A request is reported when it is first seen, whenever its resource
/// version changes, and on every resync. Deletions are only forgotten.
pub struct PollingInformer {
    store: Arc<dyn RequestStore>,
    handler: EventHandler,
    poll_interval: Duration,
    /// Zero disables periodic resyncs
    resync_interval: Duration,
    /// Fingerprint of every request seen by the last poll
    seen: Mutex<HashMap<String, String>>,
    synced: AtomicBool,
}

impl PollingInformer {
    pub fn new(
        store: Arc<dyn RequestStore>,
        handler: EventHandler,
        poll_interval: Duration,
        resync_interval: Duration,
    ) -> Self {
        Self {
            store,
            handler,
            poll_interval,
            resync_interval,
            seen: Mutex::new(HashMap::new()),
            synced: AtomicBool::new(false),
        }
    }

    /// Whether a full listing has been delivered at least once
    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    /// Poll once, reporting new and changed requests. Returns how many were
    /// reported.
    pub async fn sync_once(&self) -> Result<usize> {
        self.poll(false).await
    }

    /// Report every request regardless of changes
    pub async fn resync(&self) -> Result<usize> {
        self.poll(true).await
    }

    async fn poll(&self, everything: bool) -> Result<usize> {
        let requests = self.store.list().await?;

        let mut current = HashMap::with_capacity(requests.len());
        let mut changed = Vec::new();
        {
            let seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
            for csr in &requests {
                let fingerprint = fingerprint(csr);
                if everything || seen.get(csr.name()) != Some(&fingerprint) {
                    changed.push(csr.name().to_string());
                }
                current.insert(csr.name().to_string(), fingerprint);
            }
        }

        for name in &changed {
            (self.handler)(name);
        }

        *self.seen.lock().unwrap_or_else(|e| e.into_inner()) = current;
        if !self.synced.swap(true, Ordering::SeqCst) {
            info!("Initial listing delivered: {} requests", requests.len());
        }

        debug!("Poll reported {} of {} requests", changed.len(), requests.len());
        Ok(changed.len())
    }

    /// Poll until `shutdown` turns true
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_resync = Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let resync = !self.resync_interval.is_zero()
                        && last_resync.elapsed() >= self.resync_interval;
                    if resync {
                        debug!("Resyncing all requests");
                        last_resync = Instant::now();
                    }

                    if let Err(e) = self.poll(resync).await {
                        error!("Failed to list requests: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Informer stopped");
    }
}

fn fingerprint(csr: &CertificateSigningRequest) -> String {
    match &csr.metadata.resource_version {
        Some(version) => version.clone(),
        None => serde_json::to_string(csr).unwrap_or_default(),
    }
}
