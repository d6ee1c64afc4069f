//! Append-only proposal store
//!
//! Proposal ids are positions in creation order, so the store is a vector
//! indexed by id and can never hold a gap.

use crate::{GovernanceError, GovernanceResult, Proposal, ProposalId};

/// Ordered, dense collection of proposals
#[derive(Debug, Clone, Default)]
pub struct ProposalStore {
    proposals: Vec<Proposal>,
}

impl ProposalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted proposals in any order.
    ///
    /// Fails if the ids are not exactly `0..n`.
    pub fn from_proposals(mut proposals: Vec<Proposal>) -> GovernanceResult<Self> {
        proposals.sort_by_key(|p| p.id);
        for (index, proposal) in proposals.iter().enumerate() {
            if proposal.id != index as ProposalId {
                return Err(GovernanceError::Serialization(format!(
                    "proposal ids are not dense: expected {}, found {}",
                    index, proposal.id
                )));
            }
        }
        Ok(Self { proposals })
    }

    /// Id the next proposal will receive
    pub fn next_id(&self) -> ProposalId {
        self.proposals.len() as ProposalId
    }

    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    pub fn get(&self, id: ProposalId) -> Option<&Proposal> {
        usize::try_from(id).ok().and_then(|index| self.proposals.get(index))
    }

    /// Append a proposal whose id must equal [`ProposalStore::next_id`]
    pub fn insert(&mut self, proposal: Proposal) -> GovernanceResult<()> {
        if proposal.id != self.next_id() {
            return Err(GovernanceError::Serialization(format!(
                "proposal id {} does not follow {}",
                proposal.id,
                self.next_id()
            )));
        }
        self.proposals.push(proposal);
        Ok(())
    }

    /// Overwrite an existing proposal with an updated copy
    pub fn replace(&mut self, proposal: Proposal) -> GovernanceResult<()> {
        let id = proposal.id;
        let slot = usize::try_from(id)
            .ok()
            .and_then(|index| self.proposals.get_mut(index))
            .ok_or(GovernanceError::ProposalDoesNotExist(id))?;
        *slot = proposal;
        Ok(())
    }

    /// Proposals in id order
    pub fn iter(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.iter()
    }
}
