//! CSR Approver - policy-driven approval gate for certificate signing requests
//!
//! Watches pending requests, matches each against the configured approval
//! profiles and records exactly one Approved or Denied condition.

// Foundational layer
pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

// Core layer
pub mod csr;
pub mod policy;
pub mod queue;
pub mod store;

// Application layer
pub mod controller;

// Interface layer
pub mod api;

// Public key types
pub use crate::controller::{CsrApproverController, PollingInformer};
pub use crate::csr::{CertificateSigningRequest, ParsedRequest};
pub use crate::error::Error;
pub use crate::policy::{PermissionProfile, ProfileSet};
pub use crate::queue::{RateLimitingQueue, WorkQueue};
pub use crate::store::RequestStore;
pub use crate::telemetry::metrics::ApproverMetrics;
pub use crate::types::Result;
