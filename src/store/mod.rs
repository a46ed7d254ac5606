//! Access to certificate signing requests held outside the approver

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::csr::{CertificateSigningRequest, CsrCondition};
use crate::types::Result;

pub use file::FileRequestStore;
pub use memory::MemoryRequestStore;

/// Request storage interface
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Fetch a request by name. `Ok(None)` when it does not exist.
    async fn get(&self, name: &str) -> Result<Option<CertificateSigningRequest>>;

    /// List every request
    async fn list(&self) -> Result<Vec<CertificateSigningRequest>>;

    /// Append a condition to the request's status in a single write.
    /// `Error::Conflict` when a decision is already recorded.
    async fn update_status(&self, name: &str, condition: CsrCondition) -> Result<()>;
}
