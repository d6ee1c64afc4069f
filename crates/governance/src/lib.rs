//! Token-gated governance engine
//!
//! Proposals are created, voted on and executed by principals whose
//! capability grants ("roles") are re-checked against an external
//! [`CapabilityOracle`] on every call. Vote weight and the quorum
//! denominator come from a [`MembershipRegistry`]. Time comes from an
//! injected [`Clock`].

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tokengate_config::ConfigError;
use tokengate_storage::StorageError;

pub use tokengate_common::Address;
pub use tokengate_config::GovernanceConfig;

pub mod capability;
pub mod clock;
pub mod events;
pub mod execution;
pub mod manager;
pub mod membership;
pub mod mock;
pub mod store;
pub mod voting;

pub use capability::{CapabilityOracle, CollaboratorError, CollaboratorResult, Role};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{EventRecord, GovernanceEvent};
pub use execution::{LoggingProposalExecutor, ProposalExecutor, RecordingProposalExecutor};
pub use manager::{GovernanceEngine, MemberInfo};
pub use membership::MembershipRegistry;
pub use mock::{MembershipNft, RoleGrant, RoleRegistry, TokenId};
pub use store::ProposalStore;
pub use voting::{Outcome, Tally, VotingResult};

/// Sequential, zero-based proposal identifier
pub type ProposalId = u64;

/// Broad classes of governance failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The caller lacks the role the action requires
    Authorization,
    /// The referenced proposal does not exist
    NotFound,
    /// The action is not valid in the proposal's current state
    State,
    /// A collaborator, storage or execution failure
    Internal,
}

/// Error types for governance operations
#[derive(Error, Debug)]
pub enum GovernanceError {
    /// Caller does not currently hold the required role
    #[error("InsufficientRolePermissions: {principal} does not hold {role}")]
    InsufficientRolePermissions { principal: Address, role: Role },

    /// No proposal with this id
    #[error("ProposalDoesNotExist: no proposal with id {0}")]
    ProposalDoesNotExist(ProposalId),

    /// The voting window has closed
    #[error("VotingEnded: voting on proposal {0} has closed")]
    VotingEnded(ProposalId),

    /// The principal already voted on this proposal
    #[error("AlreadyVoted: {voter} already voted on proposal {proposal_id}")]
    AlreadyVoted { proposal_id: ProposalId, voter: Address },

    /// The proposal has already been executed
    #[error("ProposalNotActive: proposal {0} has already been executed")]
    ProposalNotActive(ProposalId),

    /// The voting window is still open
    #[error("VotingNotEnded: voting on proposal {0} is still open")]
    VotingNotEnded(ProposalId),

    /// Not enough of the membership supply took part
    #[error("QuorumNotMet: proposal {proposal_id} had {participation} of {total_supply} units voting, {quorum_percentage}% required")]
    QuorumNotMet {
        proposal_id: ProposalId,
        participation: u64,
        total_supply: u64,
        quorum_percentage: u8,
    },

    /// Yes votes did not exceed no votes
    #[error("ProposalRejected: proposal {proposal_id} had {yes_votes} yes against {no_votes} no")]
    ProposalRejected {
        proposal_id: ProposalId,
        yes_votes: u64,
        no_votes: u64,
    },

    /// A tally would exceed the representable range
    #[error("Tally overflow on proposal {0}")]
    TallyOverflow(ProposalId),

    /// The capability oracle or membership registry failed
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// Error with storage
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The execution hook failed
    #[error("Execution error: {0}")]
    Execution(String),

    /// Persisted data could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The engine was given an invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl GovernanceError {
    /// The broad class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientRolePermissions { .. } => ErrorKind::Authorization,
            Self::ProposalDoesNotExist(_) => ErrorKind::NotFound,
            Self::VotingEnded(_)
            | Self::AlreadyVoted { .. }
            | Self::ProposalNotActive(_)
            | Self::VotingNotEnded(_)
            | Self::QuorumNotMet { .. }
            | Self::ProposalRejected { .. } => ErrorKind::State,
            Self::TallyOverflow(_)
            | Self::Collaborator(_)
            | Self::Storage(_)
            | Self::Execution(_)
            | Self::Serialization(_)
            | Self::Config(_) => ErrorKind::Internal,
        }
    }

    /// Stable condition name, e.g. `"AlreadyVoted"`
    pub fn condition(&self) -> &'static str {
        match self {
            Self::InsufficientRolePermissions { .. } => "InsufficientRolePermissions",
            Self::ProposalDoesNotExist(_) => "ProposalDoesNotExist",
            Self::VotingEnded(_) => "VotingEnded",
            Self::AlreadyVoted { .. } => "AlreadyVoted",
            Self::ProposalNotActive(_) => "ProposalNotActive",
            Self::VotingNotEnded(_) => "VotingNotEnded",
            Self::QuorumNotMet { .. } => "QuorumNotMet",
            Self::ProposalRejected { .. } => "ProposalRejected",
            Self::TallyOverflow(_) => "TallyOverflow",
            Self::Collaborator(_) => "CollaboratorFailure",
            Self::Storage(_) => "StorageFailure",
            Self::Execution(_) => "ExecutionFailure",
            Self::Serialization(_) => "SerializationFailure",
            Self::Config(_) => "InvalidConfiguration",
        }
    }

    /// Whether resubmitting the same call later can succeed.
    ///
    /// Authorization failures clear once the role is obtained and
    /// `VotingNotEnded` clears with time. Quorum is measured against the
    /// live supply, so `QuorumNotMet` is not permanent either.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientRolePermissions { .. }
                | Self::VotingNotEnded(_)
                | Self::QuorumNotMet { .. }
                | Self::Collaborator(_)
                | Self::Storage(_)
                | Self::Execution(_)
        )
    }

    /// Message suitable for showing to the caller
    pub fn user_message(&self) -> String {
        match self {
            Self::InsufficientRolePermissions { role, .. } => {
                format!("Connect an account holding {} and try again", role)
            }
            Self::ProposalDoesNotExist(id) => format!("Proposal {} does not exist", id),
            Self::VotingEnded(id) => format!("Voting on proposal {} has closed", id),
            Self::AlreadyVoted { proposal_id, .. } => {
                format!("You have already voted on proposal {}", proposal_id)
            }
            Self::ProposalNotActive(id) => format!("Proposal {} has already been executed", id),
            Self::VotingNotEnded(id) => {
                format!("Wait until voting on proposal {} closes before executing it", id)
            }
            Self::QuorumNotMet { proposal_id, .. } => {
                format!("Proposal {} did not reach quorum", proposal_id)
            }
            Self::ProposalRejected { proposal_id, .. } => {
                format!("Proposal {} was rejected by the vote", proposal_id)
            }
            other => format!("Governance service error: {}", other),
        }
    }
}

/// Result type for governance operations
pub type GovernanceResult<T> = Result<T, GovernanceError>;

/// Observable lifecycle state of a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProposalState {
    /// No proposal has this id yet
    Pending = 0,
    /// Inside the voting window
    Active = 1,
    /// Window closed without quorum or without a yes majority
    Defeated = 2,
    /// Window closed with quorum and a yes majority, awaiting execution
    Succeeded = 3,
    /// Executed; terminal
    Executed = 4,
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Active => "Active",
            Self::Defeated => "Defeated",
            Self::Succeeded => "Succeeded",
            Self::Executed => "Executed",
        };
        write!(f, "{}", name)
    }
}

/// A governance proposal and its voting state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Position in creation order
    pub id: ProposalId,
    /// Principal that created the proposal
    pub proposer: Address,
    /// Short title
    pub title: String,
    /// Free-form description
    pub description: String,
    /// Engine time at creation
    pub start_time: u64,
    /// Last instant (inclusive) at which votes are accepted
    pub end_time: u64,
    /// Accumulated yes weight
    pub yes_votes: u64,
    /// Accumulated no weight
    pub no_votes: u64,
    /// Set once by a successful execution
    pub executed: bool,
    voters: BTreeSet<Address>,
}

impl Proposal {
    /// Create a new proposal with an empty tally
    pub fn new(
        id: ProposalId,
        proposer: Address,
        title: String,
        description: String,
        start_time: u64,
        voting_period: u64,
    ) -> Self {
        Self {
            id,
            proposer,
            title,
            description,
            start_time,
            end_time: start_time.saturating_add(voting_period),
            yes_votes: 0,
            no_votes: 0,
            executed: false,
            voters: BTreeSet::new(),
        }
    }

    /// Whether votes are accepted at `now`
    pub fn is_open_for_voting(&self, now: u64) -> bool {
        !self.executed && now <= self.end_time
    }

    /// Whether the voting window has closed at `now`
    pub fn is_voting_closed(&self, now: u64) -> bool {
        now > self.end_time
    }

    /// Whether `voter` has already voted
    pub fn has_voted(&self, voter: &Address) -> bool {
        self.voters.contains(voter)
    }

    /// Principals that have voted, in address order
    pub fn voters(&self) -> impl Iterator<Item = &Address> {
        self.voters.iter()
    }

    /// Number of principals that have voted
    pub fn voter_count(&self) -> usize {
        self.voters.len()
    }

    /// Current tally
    pub fn tally(&self) -> Tally {
        Tally::new(self.yes_votes, self.no_votes)
    }

    /// Add one vote. The caller has already checked the window and that
    /// `voter` has not voted.
    pub(crate) fn record_vote(
        &mut self,
        voter: Address,
        support: bool,
        weight: u64,
    ) -> GovernanceResult<()> {
        let slot = if support { &mut self.yes_votes } else { &mut self.no_votes };
        *slot = slot
            .checked_add(weight)
            .ok_or(GovernanceError::TallyOverflow(self.id))?;
        self.voters.insert(voter);
        Ok(())
    }
}

/// The operations the governance engine exposes
#[async_trait]
pub trait Governance: Send + Sync {
    /// Create a proposal; requires the Proposer role
    async fn create_proposal(
        &self,
        principal: &Address,
        title: String,
        description: String,
    ) -> GovernanceResult<ProposalId>;

    /// Vote on a proposal; requires the Voter role. Returns the weight recorded.
    async fn vote(
        &self,
        principal: &Address,
        proposal_id: ProposalId,
        support: bool,
    ) -> GovernanceResult<u64>;

    /// Execute a succeeded proposal; requires the Executor role
    async fn execute_proposal(
        &self,
        principal: &Address,
        proposal_id: ProposalId,
    ) -> GovernanceResult<()>;

    /// Get a proposal by id
    async fn get_proposal(&self, proposal_id: ProposalId) -> GovernanceResult<Proposal>;

    /// Evaluate the lifecycle state of a proposal; unknown ids are `Pending`
    async fn get_proposal_state(&self, proposal_id: ProposalId) -> GovernanceResult<ProposalState>;

    /// Weight `principal` would vote with right now
    async fn get_voting_weight(&self, principal: &Address) -> GovernanceResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal() -> Proposal {
        Proposal::new(0, Address::from("alice"), "Title".into(), "Body".into(), 1_000, 100)
    }

    #[test]
    fn test_new_proposal_window() {
        let p = proposal();
        assert_eq!(p.end_time, 1_100);
        assert!(p.is_open_for_voting(1_100));
        assert!(!p.is_open_for_voting(1_101));
        assert!(p.is_voting_closed(1_101));
        assert_eq!(p.tally(), Tally::new(0, 0));
    }

    #[test]
    fn test_record_vote() {
        let mut p = proposal();
        p.record_vote(Address::from("bob"), true, 2).unwrap();
        p.record_vote(Address::from("carol"), false, 0).unwrap();
        assert_eq!((p.yes_votes, p.no_votes), (2, 0));
        assert!(p.has_voted(&Address::from("carol")));
        assert_eq!(p.voter_count(), 2);
    }

    #[test]
    fn test_record_vote_overflow_leaves_voter_out() {
        let mut p = proposal();
        p.yes_votes = u64::MAX;
        let err = p.record_vote(Address::from("bob"), true, 1).unwrap_err();
        assert!(matches!(err, GovernanceError::TallyOverflow(0)));
        assert!(!p.has_voted(&Address::from("bob")));
    }

    #[test]
    fn test_error_taxonomy() {
        let err = GovernanceError::InsufficientRolePermissions {
            principal: Address::from("mallory"),
            role: Role::Proposer,
        };
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(err.condition(), "InsufficientRolePermissions");
        assert!(err.is_retryable());

        let err = GovernanceError::AlreadyVoted { proposal_id: 3, voter: Address::from("bob") };
        assert_eq!(err.kind(), ErrorKind::State);
        assert!(!err.is_retryable());

        assert_eq!(GovernanceError::ProposalDoesNotExist(9).kind(), ErrorKind::NotFound);
        assert!(GovernanceError::VotingNotEnded(1).is_retryable());
        assert!(!GovernanceError::ProposalNotActive(1).is_retryable());
        assert!(GovernanceError::VotingNotEnded(1).user_message().contains("Wait"));
    }

    #[test]
    fn test_state_discriminants() {
        assert_eq!(ProposalState::Pending as u8, 0);
        assert_eq!(ProposalState::Succeeded as u8, 3);
        assert_eq!(ProposalState::Executed.to_string(), "Executed");
    }
}
