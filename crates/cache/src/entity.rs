// SPDX-License-Identifier: MIT

//! Cached entity kinds and their default TTLs (spec.md #4.4).

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    User,
    Organization,
    Squad,
    SquadMembership,
    Task,
    ExecutionStatus,
}

squad_core::simple_display! {
    Entity {
        User => "user",
        Organization => "organization",
        Squad => "squad",
        SquadMembership => "squad_membership",
        Task => "task",
        ExecutionStatus => "execution_status",
    }
}

impl Entity {
    /// Default TTL per the spec.md #4.4 table. Deployments may override
    /// these per entity when constructing a [`crate::Cache`].
    pub const fn default_ttl(self) -> Duration {
        match self {
            Self::User => Duration::from_secs(300),
            Self::Organization => Duration::from_secs(300),
            Self::Squad => Duration::from_secs(300),
            Self::SquadMembership => Duration::from_secs(300),
            Self::Task => Duration::from_secs(180),
            Self::ExecutionStatus => Duration::from_secs(30),
        }
    }

    pub const ALL: [Entity; 6] = [
        Self::User,
        Self::Organization,
        Self::Squad,
        Self::SquadMembership,
        Self::Task,
        Self::ExecutionStatus,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_status_has_the_shortest_default_ttl() {
        for entity in Entity::ALL {
            if entity != Entity::ExecutionStatus {
                assert!(Entity::ExecutionStatus.default_ttl() <= entity.default_ttl());
            }
        }
    }

    #[test]
    fn task_ttl_is_shorter_than_the_identity_entities() {
        assert!(Entity::Task.default_ttl() < Entity::Squad.default_ttl());
    }
}
