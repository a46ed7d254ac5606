//! Certificate signing request model, key usage vocabulary and PKCS#10 parsing

pub mod parse;
pub mod types;
pub mod usage;

pub use parse::{parse_request, ParsedRequest};
pub use types::{CertificateSigningRequest, ConditionType, CsrCondition, CsrSpec, CsrStatus, ObjectMeta};
pub use usage::KeyUsage;
