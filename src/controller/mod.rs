//! Reconciler and the event source that feeds it

pub mod approver;
pub mod informer;

pub use approver::{
    split_key, ControllerOptions, CsrApproverController, SyncOutcome, REASON_AUTHORIZED,
    REASON_MALFORMED, REASON_NOT_ALLOWED,
};
pub use informer::{EventHandler, PollingInformer};
