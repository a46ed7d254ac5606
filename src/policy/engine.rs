use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace, warn};

use crate::csr::{KeyUsage, ParsedRequest};
use crate::error::Error;
use crate::policy::model::*;
use crate::types::Result;

/// Immutable set of compiled permission profiles keyed by name.
///
/// - No profiles: every request is denied.
/// - A single profile named `INSECURE-AUTO-APPROVE`: every request is approved.
/// - Otherwise a request must satisfy every dimension of at least one profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSet {
    profiles: BTreeMap<String, PermissionProfile>,
}

impl ProfileSet {
    /// Validate and compile profile definitions.
    ///
    /// Entries with an empty name are skipped. A repeated name or an unknown
    /// usage token fails the whole compilation.
    pub fn compile(definitions: &[ProfileDefinition]) -> Result<Self> {
        let mut profiles = BTreeMap::new();

        for def in definitions {
            if def.name.is_empty() {
                debug!("Skipping approval profile without a name");
                continue;
            }
            if profiles.contains_key(&def.name) {
                return Err(Error::DuplicateProfile(def.name.clone()));
            }

            let allowed_usages = def
                .allowed_usages
                .iter()
                .map(|usage| usage.parse::<KeyUsage>())
                .collect::<Result<Vec<_>>>()?;

            profiles.insert(
                def.name.clone(),
                PermissionProfile {
                    allowed_names: def.allowed_names.clone(),
                    allowed_subjects: def.allowed_subjects.clone(),
                    allowed_usages,
                    allowed_users: def.allowed_users.clone(),
                    allowed_groups: def.allowed_groups.clone(),
                },
            );
        }

        if profiles.len() == 1 && profiles.contains_key(INSECURE_PROFILE_NAME) {
            warn!("Only the {} profile is configured, every request will be approved", INSECURE_PROFILE_NAME);
        }

        Ok(Self { profiles })
    }

    /// Compile an approver config document
    pub fn from_config(config: &ApproverConfig) -> Result<Self> {
        Self::compile(&config.profiles)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Look up a compiled profile
    pub fn get(&self, name: &str) -> Option<&PermissionProfile> {
        self.profiles.get(name)
    }

    /// Profile names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Whether the set consists of the insecure auto-approve profile alone
    pub fn is_insecure(&self) -> bool {
        self.profiles.len() == 1 && self.profiles.contains_key(INSECURE_PROFILE_NAME)
    }

    /// Whether any profile allows the request
    pub fn allowed(&self, attrs: &RequestAttributes<'_>, parsed: &ParsedRequest) -> bool {
        self.matching_profile(attrs, parsed).is_some()
    }

    /// Name of a profile that allows the request, if any.
    ///
    /// When several profiles allow the request, which one is returned is
    /// unspecified.
    pub fn matching_profile(&self, attrs: &RequestAttributes<'_>, parsed: &ParsedRequest) -> Option<&str> {
        if self.profiles.is_empty() {
            return None;
        }
        if self.is_insecure() {
            return Some(INSECURE_PROFILE_NAME);
        }

        for (name, profile) in &self.profiles {
            if profile.allows(attrs, parsed) {
                trace!("Request allowed by profile {}", name);
                return Some(name.as_str());
            }
        }

        None
    }
}

impl PermissionProfile {
    /// Whether the request satisfies every dimension of this profile
    pub fn allows(&self, attrs: &RequestAttributes<'_>, parsed: &ParsedRequest) -> bool {
        self.usages_allowed(attrs.usages)
            && self.groups_allowed(attrs.groups)
            && self.user_allowed(attrs.username)
            && self.subject_allowed(&parsed.subject)
            && self.names_allowed(&parsed.dns_names)
    }

    fn usages_allowed(&self, usages: &[String]) -> bool {
        if self.allowed_usages.is_empty() {
            return true;
        }
        let allowed: HashSet<&str> = self.allowed_usages.iter().map(KeyUsage::as_str).collect();
        usages.iter().all(|usage| allowed.contains(usage.as_str()))
    }

    fn groups_allowed(&self, groups: &[String]) -> bool {
        self.allowed_groups.is_empty() || is_subset(groups, &self.allowed_groups)
    }

    fn names_allowed(&self, names: &[String]) -> bool {
        self.allowed_names.is_empty() || is_subset(names, &self.allowed_names)
    }

    fn user_allowed(&self, user: &str) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.iter().any(|u| u == user)
    }

    fn subject_allowed(&self, subject: &str) -> bool {
        self.allowed_subjects.is_empty() || self.allowed_subjects.iter().any(|s| s == subject)
    }
}

/// Every element of `requested` appears in `allowed`
fn is_subset(requested: &[String], allowed: &[String]) -> bool {
    let allowed: HashSet<&str> = allowed.iter().map(String::as_str).collect();
    requested.iter().all(|value| allowed.contains(value.as_str()))
}
