use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::debug;

use crate::csr::{CertificateSigningRequest, CsrCondition};
use crate::error::Error;
use crate::store::RequestStore;
use crate::types::Result;

/// In-memory request store
#[derive(Default)]
pub struct MemoryRequestStore {
    requests: RwLock<BTreeMap<String, CertificateSigningRequest>>,
    /// Last resource version handed out
    version: AtomicU64,
}

impl MemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a request
    pub fn insert(&self, mut csr: CertificateSigningRequest) {
        csr.metadata.resource_version = Some(self.next_version());
        let mut requests = self.requests.write().unwrap_or_else(|e| e.into_inner());
        requests.insert(csr.metadata.name.clone(), csr);
    }

    /// Delete a request
    pub fn remove(&self, name: &str) -> Option<CertificateSigningRequest> {
        let mut requests = self.requests.write().unwrap_or_else(|e| e.into_inner());
        requests.remove(name)
    }

    /// Snapshot of a request
    pub fn snapshot(&self, name: &str) -> Option<CertificateSigningRequest> {
        let requests = self.requests.read().unwrap_or_else(|e| e.into_inner());
        requests.get(name).cloned()
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

#[async_trait]
impl RequestStore for MemoryRequestStore {
    async fn get(&self, name: &str) -> Result<Option<CertificateSigningRequest>> {
        Ok(self.snapshot(name))
    }

    async fn list(&self) -> Result<Vec<CertificateSigningRequest>> {
        let requests = self.requests.read().unwrap_or_else(|e| e.into_inner());
        Ok(requests.values().cloned().collect())
    }

    async fn update_status(&self, name: &str, condition: CsrCondition) -> Result<()> {
        let mut requests = self.requests.write().unwrap_or_else(|e| e.into_inner());
        let csr = requests
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("certificate signing request {}", name)))?;
        if let Some(decision) = csr.decision() {
            return Err(Error::Conflict(format!(
                "certificate signing request {} is already {}",
                name, decision
            )));
        }

        let version = self.next_version();

        debug!("Recording {} condition on {}", condition.condition_type, name);
        csr.status.conditions.push(condition);
        csr.metadata.resource_version = Some(version);
        Ok(())
    }
}
