//! Governance events and the receipt log entry that carries them

use serde::{Deserialize, Serialize};

use tokengate_common::Address;

use crate::ProposalId;

/// Something observable the engine did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GovernanceEvent {
    ProposalCreated {
        id: ProposalId,
        proposer: Address,
        title: String,
    },
    VoteCast {
        proposal_id: ProposalId,
        voter: Address,
        support: bool,
        weight: u64,
    },
    ProposalExecuted {
        proposal_id: ProposalId,
    },
}

impl GovernanceEvent {
    /// Proposal the event refers to
    pub fn proposal_id(&self) -> ProposalId {
        match self {
            Self::ProposalCreated { id, .. } => *id,
            Self::VoteCast { proposal_id, .. } | Self::ProposalExecuted { proposal_id } => {
                *proposal_id
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ProposalCreated { .. } => "ProposalCreated",
            Self::VoteCast { .. } => "VoteCast",
            Self::ProposalExecuted { .. } => "ProposalExecuted",
        }
    }
}

/// A persisted event with its position in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub timestamp: u64,
    pub event: GovernanceEvent,
}
