// SPDX-License-Identifier: MIT

//! Entity identifiers for the squad execution core.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

crate::define_id! {
    /// Unique identifier for one run of a workflow.
    pub struct ExecutionId("exe-");
}

crate::define_id! {
    /// Identifier of the squad (collaborator-owned; referenced, not managed, by the core).
    pub struct SquadId("sqd-");
}

crate::define_id! {
    /// Identifier of the task being worked (collaborator-owned).
    pub struct TaskId("tsk-");
}

crate::define_id! {
    /// Identifier of the owning organization (collaborator-owned).
    pub struct OrgId("org-");
}

crate::define_id! {
    /// Identifier of one appended [`crate::event::AgentEvent`].
    pub struct EventId("evt-");
}

crate::define_id! {
    /// Identifier of one live stream [`crate::subscription::Subscription`].
    pub struct SubscriptionId("sub-");
}

crate::define_id! {
    /// Identifier of a worker process that may hold execution leases.
    pub struct WorkerId("wkr-");
}

/// Name of one static step in a workflow's pipeline, e.g. `"plan"`.
///
/// Interned as a [`SmolStr`] since step names are small, repeated often (as
/// map keys and event fields), and rarely heap-allocate at that size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepName(pub SmolStr);

impl StepName {
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(SmolStr::new(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::borrow::Borrow<str> for StepName {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq<str> for StepName {
    fn eq(&self, other: &str) -> bool {
        self.0.as_str() == other
    }
}

impl PartialEq<&str> for StepName {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_str() == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn step_name_borrows_as_str_for_map_lookup() {
        let mut map = HashMap::new();
        map.insert(StepName::new("plan"), 1);
        assert_eq!(map.get("plan"), Some(&1));
    }

    #[test]
    fn ids_have_distinct_prefixes() {
        assert!(ExecutionId::new().as_str().starts_with("exe-"));
        assert!(SquadId::new().as_str().starts_with("sqd-"));
        assert!(TaskId::new().as_str().starts_with("tsk-"));
        assert!(OrgId::new().as_str().starts_with("org-"));
        assert!(EventId::new().as_str().starts_with("evt-"));
        assert!(SubscriptionId::new().as_str().starts_with("sub-"));
        assert!(WorkerId::new().as_str().starts_with("wkr-"));
    }

    #[test]
    fn execution_id_serde_roundtrip() {
        let id = ExecutionId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ExecutionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
