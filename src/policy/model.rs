use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::csr::{CsrSpec, KeyUsage};

/// Profile name that, when it is the only profile, approves every request
pub const INSECURE_PROFILE_NAME: &str = "INSECURE-AUTO-APPROVE";

/// Approver configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApproverConfig {
    /// Ordered profile definitions
    #[serde(default)]
    pub profiles: Vec<ProfileDefinition>,
}

impl ApproverConfig {
    /// Load from a YAML file
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .context(format!("Failed to read approver config: {}", path.as_ref().display()))?;

        Self::from_yaml(&content)
    }

    /// Load from YAML text
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse approver config YAML")
    }
}

/// Raw profile definition as written by the operator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub allowed_names: Vec<String>,
    #[serde(default)]
    pub allowed_subjects: Vec<String>,
    #[serde(default)]
    pub allowed_usages: Vec<String>,
    #[serde(default)]
    pub allowed_users: Vec<String>,
    #[serde(default)]
    pub allowed_groups: Vec<String>,
}

/// Compiled permission profile. An empty list places no restriction on its
/// dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionProfile {
    pub allowed_names: Vec<String>,
    pub allowed_subjects: Vec<String>,
    pub allowed_usages: Vec<KeyUsage>,
    pub allowed_users: Vec<String>,
    pub allowed_groups: Vec<String>,
}

/// The attributes of a request that come from the API object rather than the
/// PKCS#10 payload
#[derive(Debug, Clone, Copy)]
pub struct RequestAttributes<'a> {
    pub usages: &'a [String],
    pub username: &'a str,
    pub groups: &'a [String],
}

impl<'a> From<&'a CsrSpec> for RequestAttributes<'a> {
    fn from(spec: &'a CsrSpec) -> Self {
        Self {
            usages: &spec.usages,
            username: &spec.username,
            groups: &spec.groups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
        profiles:
          - name: nodes
            allowedUsages: ["client auth", "digital signature", "key encipherment"]
            allowedGroups: ["system:nodes"]
          - name: web
            allowedNames: ["web.example.com"]
            allowedSubjects: ["CN=web"]
            allowedUsers: ["deployer"]
        "#;

        let config = ApproverConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.profiles[0].name, "nodes");
        assert_eq!(config.profiles[0].allowed_usages.len(), 3);
        assert!(config.profiles[0].allowed_names.is_empty());
        assert_eq!(config.profiles[1].allowed_subjects, vec!["CN=web"]);
        assert_eq!(config.profiles[1].allowed_users, vec!["deployer"]);
    }

    #[test]
    fn test_config_without_profiles() {
        let config = ApproverConfig::from_yaml("{}").unwrap();
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_config_from_missing_file() {
        let err = ApproverConfig::from_path("/nonexistent/approver.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read approver config"));
    }
}
