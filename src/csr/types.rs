use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Certificate signing request as stored by the cluster API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSigningRequest {
    /// Object metadata
    pub metadata: ObjectMeta,
    /// What the requester asked for
    pub spec: CsrSpec,
    /// Decision conditions
    #[serde(default)]
    pub status: CsrStatus,
}

/// Object metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name
    pub name: String,
    /// Opaque version maintained by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

/// Request spec
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrSpec {
    /// PEM-encoded PKCS#10 request, base64 on the wire
    #[serde(with = "base64_bytes")]
    pub request: Vec<u8>,
    /// Requested key usages
    #[serde(default)]
    pub usages: Vec<String>,
    /// Requesting user
    #[serde(default)]
    pub username: String,
    /// Requesting user's groups
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Request status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CsrStatus {
    #[serde(default)]
    pub conditions: Vec<CsrCondition>,
}

/// A single status condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrCondition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub reason: String,
    pub message: String,
    pub last_update_time: DateTime<Utc>,
}

/// Condition types. Only `Approved` and `Denied` are decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Approved,
    Denied,
    /// Set by the signer when issuance failed
    Failed,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionType::Approved => write!(f, "Approved"),
            ConditionType::Denied => write!(f, "Denied"),
            ConditionType::Failed => write!(f, "Failed"),
        }
    }
}

impl CertificateSigningRequest {
    /// Create a request with no status
    pub fn new(name: impl Into<String>, spec: CsrSpec) -> Self {
        Self {
            metadata: ObjectMeta {
                name: name.into(),
                resource_version: None,
            },
            spec,
            status: CsrStatus::default(),
        }
    }

    /// Object name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// The terminal condition, if a decision was already recorded
    pub fn decision(&self) -> Option<ConditionType> {
        self.status
            .conditions
            .iter()
            .map(|c| c.condition_type)
            .find(|t| matches!(t, ConditionType::Approved | ConditionType::Denied))
    }

    /// Whether the request already carries a terminal condition
    pub fn is_decided(&self) -> bool {
        self.decision().is_some()
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_cluster_json() {
        let json = r#"{
            "metadata": {"name": "node-csr-1", "resourceVersion": "7"},
            "spec": {
                "request": "aGVsbG8=",
                "usages": ["client auth"],
                "username": "system:node:worker-1",
                "groups": ["system:nodes", "system:authenticated"]
            },
            "status": {
                "conditions": [{
                    "type": "Approved",
                    "reason": "AutoApproved",
                    "message": "ok",
                    "lastUpdateTime": "2026-01-02T03:04:05Z"
                }]
            }
        }"#;

        let csr: CertificateSigningRequest = serde_json::from_str(json).unwrap();
        assert_eq!(csr.name(), "node-csr-1");
        assert_eq!(csr.metadata.resource_version.as_deref(), Some("7"));
        assert_eq!(csr.spec.request, b"hello");
        assert_eq!(csr.spec.groups.len(), 2);
        assert_eq!(csr.decision(), Some(ConditionType::Approved));
    }

    #[test]
    fn test_missing_status_is_undecided() {
        let json = r#"{"metadata": {"name": "a"}, "spec": {"request": ""}}"#;

        let csr: CertificateSigningRequest = serde_json::from_str(json).unwrap();
        assert!(!csr.is_decided());
        assert!(csr.spec.usages.is_empty());
        assert_eq!(csr.spec.username, "");
    }
}
