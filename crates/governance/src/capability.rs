//! Role vocabulary and the capability oracle seam
//!
//! The engine never decides on its own whether a principal holds a role.
//! It asks a [`CapabilityOracle`] on every gated call and does not cache
//! the answer, so grants that expire or are revoked take effect on the
//! very next call.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tokengate_common::Address;

/// Capabilities a principal can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// May cast votes
    Voter,
    /// May create proposals
    Proposer,
    /// May execute succeeded proposals
    Executor,
    /// Administrative role, not used by the engine's gates
    Admin,
}

impl Role {
    /// Every role, in declaration order
    pub const ALL: [Role; 4] = [Role::Voter, Role::Proposer, Role::Executor, Role::Admin];

    /// Canonical role identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Voter => "VOTER_ROLE",
            Role::Proposer => "PROPOSER_ROLE",
            Role::Executor => "EXECUTOR_ROLE",
            Role::Admin => "ADMIN_ROLE",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = CollaboratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let name = upper.strip_suffix("_ROLE").unwrap_or(&upper);
        match name {
            "VOTER" => Ok(Role::Voter),
            "PROPOSER" => Ok(Role::Proposer),
            "EXECUTOR" => Ok(Role::Executor),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(CollaboratorError::Rejected(format!("unknown role: {}", s))),
        }
    }
}

/// Failures reported by the capability oracle or the membership registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The collaborator could not be reached
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// The collaborator refused the request
    #[error("collaborator rejected request: {0}")]
    Rejected(String),
}

/// Result type for collaborator calls
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Answers whether a principal currently holds a role
#[async_trait]
pub trait CapabilityOracle: Send + Sync {
    /// True iff `principal` holds an unexpired, unrevoked grant for `role`
    async fn has_valid_role(&self, role: Role, principal: &Address) -> CollaboratorResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_names() {
        assert_eq!(Role::Voter.to_string(), "VOTER_ROLE");
        assert_eq!("proposer".parse::<Role>().unwrap(), Role::Proposer);
        assert_eq!("EXECUTOR_ROLE".parse::<Role>().unwrap(), Role::Executor);
        assert!("treasurer".parse::<Role>().is_err());

        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }
}
